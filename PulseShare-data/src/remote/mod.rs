// Hosted shared store access
// Insert and list go over PostgREST-style HTTP, the change feed over a
// Phoenix-channel WebSocket.

mod realtime;
mod rest;

pub use realtime::{open_insert_feed, ChannelMessage};
pub use rest::RestSharedBackend;

pub use crate::models::DEFAULT_SHARED_TABLE;

use std::time::Duration;

/// Connection settings for the hosted shared store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the project, e.g. `https://example.supabase.co`
    pub api_url: String,
    /// Public API key sent with every request
    pub api_key: String,
    /// Base URL for the realtime socket, defaults to `api_url` with a ws scheme
    pub realtime_url: Option<String>,
    /// Table name
    pub table: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Settings with the default table and a 10 second timeout
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            realtime_url: None,
            table: DEFAULT_SHARED_TABLE.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Realtime socket base, derived from the API URL when not set
    pub fn realtime_base(&self) -> String {
        if let Some(url) = &self.realtime_url {
            return url.trim_end_matches('/').to_string();
        }

        let base = self.api_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }
}

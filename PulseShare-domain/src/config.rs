//! Configuration from the environment (and `.env`, when present)

use std::env;
use std::time::Duration;

use pulse_share_data::database::{DatabaseConfig, DatabaseError};
use thiserror::Error;
use tracing::{debug, info};

use crate::services::local_store::DEFAULT_LOCAL_STORE_KEY;
use crate::services::retry::RetryPolicy;

pub use pulse_share_data::models::DEFAULT_SHARED_TABLE;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but unusable
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },

    /// Database settings could not be read
    #[error("Database configuration error: {0}")]
    Database(#[from] DatabaseError),
}

/// Settings for the local history and the shared store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Key the local history is stored under
    pub local_store_key: String,
    /// Base URL of the shared store; without it readings are shared in-process only
    pub shared_api_url: Option<String>,
    pub shared_api_key: Option<String>,
    /// Realtime socket base, derived from the API URL when absent
    pub shared_realtime_url: Option<String>,
    pub shared_table: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            local_store_key: DEFAULT_LOCAL_STORE_KEY.to_string(),
            shared_api_url: None,
            shared_api_key: None,
            shared_realtime_url: None,
            shared_table: DEFAULT_SHARED_TABLE.to_string(),
            max_retries: policy.max_retries,
            retry_delay: policy.delay,
        }
    }
}

impl SyncConfig {
    /// Read from environment variables, loading `.env` first
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_retries = match non_empty("SYNC_MAX_RETRIES") {
            Some(raw) => parse_number("SYNC_MAX_RETRIES", &raw)?,
            None => defaults.max_retries,
        };
        let retry_delay = match non_empty("SYNC_RETRY_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("SYNC_RETRY_DELAY_MS", &raw)?),
            None => defaults.retry_delay,
        };

        let config = SyncConfig {
            local_store_key: non_empty("LOCAL_STORE_KEY").unwrap_or(defaults.local_store_key),
            shared_api_url: non_empty("SHARED_API_URL"),
            shared_api_key: non_empty("SHARED_API_KEY"),
            shared_realtime_url: non_empty("SHARED_REALTIME_URL"),
            shared_table: non_empty("SHARED_TABLE").unwrap_or(defaults.shared_table),
            max_retries,
            retry_delay,
        };

        match &config.shared_api_url {
            Some(url) => info!("Sharing readings through {}", url),
            None => info!("SHARED_API_URL not set, sharing readings in-process only"),
        }
        debug!("Sync retry policy: {:?}", config.retry_policy());

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Connection settings for the hosted shared store, if one is configured
    #[cfg(feature = "remote")]
    pub fn remote_config(&self) -> Option<pulse_share_data::remote::RemoteConfig> {
        let url = self.shared_api_url.as_ref()?;
        let mut config =
            pulse_share_data::remote::RemoteConfig::new(url.clone(), self.shared_api_key.clone().unwrap_or_default());
        config.realtime_url = self.shared_realtime_url.clone();
        config.table = self.shared_table.clone();
        Some(config)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
    })
}

/// Everything needed to build a reading service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load `.env` and read both sections from the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            sync: SyncConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.local_store_key, "bp-readings");
        assert_eq!(config.retry_policy(), RetryPolicy::new(3, Duration::from_secs(1)));
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SHARED_API_URL", "https://demo.example.co"),
            ("SHARED_API_KEY", "anon"),
            ("SHARED_TABLE", "readings"),
            ("SYNC_MAX_RETRIES", "5"),
            ("SYNC_RETRY_DELAY_MS", "250"),
            ("LOCAL_STORE_KEY", " "),
        ]))
        .unwrap();

        assert_eq!(config.shared_api_url.as_deref(), Some("https://demo.example.co"));
        assert_eq!(config.shared_table, "readings");
        assert_eq!(config.retry_policy(), RetryPolicy::new(5, Duration::from_millis(250)));
        assert_eq!(config.local_store_key, DEFAULT_LOCAL_STORE_KEY);
    }

    #[test]
    fn test_shared_table_default_matches_data_layer() {
        assert_eq!(SyncConfig::default().shared_table, "shared_bp_readings");
        assert_eq!(DEFAULT_SHARED_TABLE, pulse_share_data::models::DEFAULT_SHARED_TABLE);
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = tokio_test::assert_err!(SyncConfig::from_lookup(lookup(&[("SYNC_MAX_RETRIES", "three")])));
        assert!(matches!(err, ConfigError::InvalidValue { ref name, .. } if name == "SYNC_MAX_RETRIES"));
    }

    #[cfg(feature = "remote")]
    #[test]
    fn test_remote_config_only_when_url_set() {
        assert!(SyncConfig::default().remote_config().is_none());

        let config = SyncConfig::from_lookup(lookup(&[
            ("SHARED_API_URL", "https://demo.example.co"),
            ("SHARED_API_KEY", "anon"),
        ]))
        .unwrap();
        let remote = config.remote_config().unwrap();
        assert_eq!(remote.api_key, "anon");
        assert_eq!(remote.table, DEFAULT_SHARED_TABLE);
    }
}

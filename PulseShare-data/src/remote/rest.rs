use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, error};

use super::realtime::open_insert_feed;
use super::RemoteConfig;
use crate::models::reading::{NewSharedReading, SharedReadingRow};
use crate::repository::{InsertFeed, RepositoryError, SharedReadingsBackend};

/// Shared store reached over a PostgREST-style HTTP interface
#[derive(Debug, Clone)]
pub struct RestSharedBackend {
    client: Client,
    config: RemoteConfig,
}

impl RestSharedBackend {
    /// Create a backend with its own HTTP client
    pub fn new(config: RemoteConfig) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Connection settings in use
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.table
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }
}

/// Turn a non-success response into a `Remote` error carrying the body
async fn check_status(response: Response) -> Result<Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    error!("Shared store returned {}: {}", status, message);
    Err(RepositoryError::Remote {
        status: status.as_u16(),
        message,
    })
}

fn transport(error: reqwest::Error) -> RepositoryError {
    RepositoryError::Transport(error.to_string())
}

#[async_trait]
impl SharedReadingsBackend for RestSharedBackend {
    async fn insert(&self, reading: NewSharedReading) -> Result<SharedReadingRow, RepositoryError> {
        debug!("Inserting shared reading {}", reading.id);

        let response = self
            .authorize(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&reading)
            .send()
            .await
            .map_err(transport)?;
        // primary key violation: a row with this id is already shared
        if response.status() == StatusCode::CONFLICT {
            return Err(RepositoryError::Conflict(reading.id));
        }
        let response = check_status(response).await?;
        let status = response.status().as_u16();

        let mut rows: Vec<SharedReadingRow> = response.json().await.map_err(transport)?;
        rows.pop().ok_or(RepositoryError::Remote {
            status,
            message: "insert returned no rows".to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<SharedReadingRow>, RepositoryError> {
        debug!("Listing shared readings from {}", self.config.table);

        let response = self
            .authorize(self.client.get(self.table_url()))
            .query(&[("select", "*"), ("order", "shared_at.desc")])
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;

        let rows: Vec<SharedReadingRow> = response.json().await.map_err(transport)?;
        debug!("Received {} shared readings", rows.len());
        Ok(rows)
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed, RepositoryError> {
        open_insert_feed(&self.config.realtime_base(), &self.config.api_key, &self.config.table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url() {
        let backend = RestSharedBackend::new(RemoteConfig::new("https://demo.example.co/", "key")).unwrap();
        assert_eq!(backend.table_url(), "https://demo.example.co/rest/v1/shared_bp_readings");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() {
        let mut config = RemoteConfig::new("http://127.0.0.1:9", "key");
        config.timeout = std::time::Duration::from_millis(500);
        let backend = RestSharedBackend::new(config).unwrap();

        let result = backend.list().await;
        assert!(matches!(result, Err(RepositoryError::Transport(_))));
    }
}

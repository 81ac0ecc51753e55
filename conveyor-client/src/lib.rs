//! Conveyor HTTP Client
//!
//! A type-safe HTTP client for the Conveyor server API.
//!
//! Used by the CLI for the job lifecycle (create, get, list, cancel) and by
//! workers for the internal push bridge that reaches observer sockets owned
//! by the server.

pub mod error;
mod jobs;
mod notify;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the Conveyor server API
#[derive(Debug, Clone)]
pub struct ServerClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Shared secret for internal endpoints
    api_key: Option<String>,
}

impl ServerClient {
    /// Create a new server client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the server API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a server client whose requests fail after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a new server client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            api_key: None,
        }
    }

    /// Attach the internal API key used by [`ServerClient::notify`]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ServerClient::new("http://localhost:8080");
        assert_eq!(client.base_url, "http://localhost:8080");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ServerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_client_with_timeout() {
        let client =
            ServerClient::with_timeout("http://localhost:8080/", Duration::from_millis(250)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = ServerClient::new("http://localhost:8080").with_api_key("secret");
        assert_eq!(client.api_key.as_deref(), Some("secret"));
    }
}

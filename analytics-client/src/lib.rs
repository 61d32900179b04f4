//! Analytics Pipeline HTTP Client
//!
//! A type-safe HTTP client for the analytics pipeline registry API.
//!
//! Requests carry the caller's identity either as a bearer token or as the
//! `X-UserId` / `X-User-Roles` headers a gateway would forward.
//!
//! # Example
//!
//! ```no_run
//! use analytics_client::PipelineClient;
//! use analytics_core::domain::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = PipelineClient::new("http://localhost:8000").with_user("u1");
//!
//!     let id = client
//!         .save_pipeline(&Pipeline {
//!             name: "temperature-average".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("Saved pipeline: {}", id);
//!     Ok(())
//! }
//! ```

mod admin;
pub mod error;
mod pipelines;

// Re-export commonly used types
pub use analytics_core::query::ListQuery;
pub use error::{ClientError, Result};

use reqwest::{Client, Method, RequestBuilder, header::AUTHORIZATION};
use serde::de::DeserializeOwned;

/// HTTP client for the pipeline registry API
///
/// Methods are grouped into:
/// - Pipeline management for the calling user (save, update, get, delete, list)
/// - Administration (list all, delete any, statistics, permission reconciliation)
#[derive(Debug, Clone)]
pub struct PipelineClient {
    /// Base URL of the registry including any route prefix (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
    token: Option<String>,
    user_id: Option<String>,
    roles: Vec<String>,
}

impl PipelineClient {
    /// Create a new client without credentials
    ///
    /// # Example
    /// ```
    /// use analytics_client::PipelineClient;
    ///
    /// let client = PipelineClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use analytics_client::PipelineClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = PipelineClient::with_client("http://localhost:8000", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: None,
            user_id: None,
            roles: Vec::new(),
        }
    }

    /// Authenticate with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Send `X-UserId` on every request
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Send `X-User-Roles` on every request
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Get the base URL of the registry
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a request to `path` carrying the configured credentials
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(token) = &self.token {
            let value = if token.to_ascii_lowercase().starts_with("bearer ") {
                token.clone()
            } else {
                format!("Bearer {}", token)
            };
            request = request.header(AUTHORIZATION, value);
        }
        if let Some(user_id) = &self.user_id {
            request = request.header("X-UserId", user_id);
        }
        if !self.roles.is_empty() {
            request = request.header("X-User-Roles", self.roles.join(", "));
        }
        request
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
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

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

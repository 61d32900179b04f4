//! HTTP permission client
//!
//! Talks to a permissions-v2 style capability service. Caller tokens are
//! forwarded as the `Authorization` header, gaining a `Bearer` scheme when
//! they lack one.

use analytics_core::domain::permission::{Capability, Resource, ResourcePermissions, Topic};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{PermissionClient, PermissionError, Result};

/// Page size used when walking paginated listings
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct HttpPermissionClient {
    /// Base URL of the permission service (e.g., "http://permv2.permissions:8080")
    base_url: Url,
    client: Client,
}

impl HttpPermissionClient {
    /// Creates a client whose requests time out after `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    /// Creates a client around a preconfigured reqwest client
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PermissionError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PermissionError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, bearer(token))
    }

    /// Fetches every page of a paginated listing
    async fn fetch_all<T: DeserializeOwned>(
        &self,
        token: &str,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let limit = PAGE_SIZE.to_string();

        loop {
            let offset = items.len().to_string();
            let request = self
                .client
                .get(url.clone())
                .query(query)
                .query(&[("limit", limit.as_str()), ("offset", offset.as_str())]);
            let response = self.authorized(request, token).send().await?;
            let page: Vec<T> = handle_response(response).await?;

            let page_len = page.len();
            items.extend(page);
            if page_len < PAGE_SIZE {
                return Ok(items);
            }
        }
    }
}

#[async_trait]
impl PermissionClient for HttpPermissionClient {
    async fn ensure_topic(&self, token: &str, topic: &Topic) -> Result<()> {
        let url = self.endpoint(&["admin", "topics", &topic.id]);
        let request = self.client.put(url).json(topic);
        let response = self.authorized(request, token).send().await?;

        handle_empty_response(response).await
    }

    async fn check_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        capability: Capability,
    ) -> Result<bool> {
        let url = self.endpoint(&["check", topic, id, capability.code()]);
        let response = self.authorized(self.client.get(url), token).send().await?;

        handle_response(response).await
    }

    async fn list_accessible_resource_ids(
        &self,
        token: &str,
        topic: &str,
        capability: Capability,
    ) -> Result<Vec<String>> {
        let url = self.endpoint(&["accessible", topic]);
        self.fetch_all(token, url, &[("permissions", capability.code())])
            .await
    }

    async fn get_resource(&self, token: &str, topic: &str, id: &str) -> Result<Option<Resource>> {
        let url = self.endpoint(&["manage", topic, id]);
        let response = self.authorized(self.client.get(url), token).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        handle_response(response).await.map(Some)
    }

    async fn list_resources(&self, token: &str, topic: &str) -> Result<Vec<Resource>> {
        let url = self.endpoint(&["manage", topic]);
        self.fetch_all(token, url, &[]).await
    }

    async fn set_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()> {
        let url = self.endpoint(&["manage", topic, id]);
        let request = self.client.put(url).json(permissions);
        let response = self.authorized(request, token).send().await?;

        handle_empty_response(response).await
    }

    async fn remove_resource(&self, token: &str, topic: &str, id: &str) -> Result<()> {
        let url = self.endpoint(&["manage", topic, id]);
        let response = self
            .authorized(self.client.delete(url), token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        handle_empty_response(response).await
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Checks the status code and deserializes a JSON body
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        return Err(api_error(status, response).await);
    }

    response
        .json()
        .await
        .map_err(|e| PermissionError::Parse(format!("Failed to parse JSON response: {}", e)))
}

/// Checks the status code of a response whose body is ignored
async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        return Err(api_error(status, response).await);
    }

    Ok(())
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> PermissionError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    PermissionError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Authorization header value for a token that may lack its scheme
fn bearer(token: &str) -> String {
    let token = token.trim();
    if token
        .get(..7)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer "))
    {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

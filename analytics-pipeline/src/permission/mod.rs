//! Permission client
//!
//! Seam to the external capability service that owns the permission records
//! of every pipeline. The registry holds an `Arc<dyn PermissionClient>`; the
//! HTTP implementation talks to the real service and the in-memory one stands
//! in for it in tests and local runs.

pub mod http;
pub mod memory;

pub use http::HttpPermissionClient;
pub use memory::InMemoryPermissionClient;

use analytics_core::domain::permission::{Capability, Resource, ResourcePermissions, Topic};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermissionError {
    /// HTTP request failed
    #[error("permission request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Permission service answered with an error status
    #[error("permission service error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed
    #[error("failed to parse permission service response: {0}")]
    Parse(String),

    /// Configured service URL is unusable
    #[error("invalid permission service url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, PermissionError>;

#[async_trait]
pub trait PermissionClient: Send + Sync {
    /// Registers (or updates) a topic and its default permissions
    async fn ensure_topic(&self, token: &str, topic: &Topic) -> Result<()>;

    /// Whether the token's subject holds `capability` on resource `id`
    async fn check_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        capability: Capability,
    ) -> Result<bool>;

    /// Ids of every resource on which the token's subject holds `capability`
    async fn list_accessible_resource_ids(
        &self,
        token: &str,
        topic: &str,
        capability: Capability,
    ) -> Result<Vec<String>>;

    /// Current permission record of a resource, `None` if never registered
    async fn get_resource(&self, token: &str, topic: &str, id: &str) -> Result<Option<Resource>>;

    /// Every resource registered under the topic
    async fn list_resources(&self, token: &str, topic: &str) -> Result<Vec<Resource>>;

    /// Creates or overwrites the permission record of a resource
    async fn set_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()>;

    /// Removes a resource; removing an unknown resource succeeds
    async fn remove_resource(&self, token: &str, topic: &str, id: &str) -> Result<()>;
}

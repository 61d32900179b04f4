//! Repository Module
//!
//! Data access layer for pipeline documents.
//! The registry only sees the `PipelineRepository` trait; PostgreSQL backs it in
//! production and an in-memory store backs tests and local runs.

pub mod memory;
pub mod pipeline;

pub use memory::InMemoryPipelineRepository;
pub use pipeline::PgPipelineRepository;

use analytics_core::domain::pipeline::Pipeline;
use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::PipelinesResponse;
use analytics_core::query::ListQuery;
use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("pipeline {0} not found")]
    NotFound(String),

    #[error("pipeline {0} already exists")]
    Duplicate(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("pipeline document could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Which pipelines a listing may return
#[derive(Debug, Clone, Copy)]
pub enum ListScope<'a> {
    /// Pipelines owned by `user_id` plus those whose id is in `accessible_ids`
    User {
        user_id: &'a str,
        accessible_ids: &'a [String],
    },
    /// Every pipeline
    Admin,
}

impl ListScope<'_> {
    pub fn includes(&self, pipeline: &Pipeline) -> bool {
        match self {
            ListScope::User {
                user_id,
                accessible_ids,
            } => pipeline.user_id == *user_id || accessible_ids.contains(&pipeline.id),
            ListScope::Admin => true,
        }
    }
}

/// Storage operations the registry relies on
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Persists a new pipeline
    async fn insert(&self, pipeline: &Pipeline) -> Result<()>;

    /// Overwrites the pipeline with the same id
    ///
    /// Replacing a missing id is not an error at this layer.
    async fn replace(&self, pipeline: &Pipeline) -> Result<()>;

    /// Loads a pipeline, `NotFound` when absent
    async fn find(&self, id: &str) -> Result<Pipeline>;

    /// Removes a pipeline, `NotFound` when absent
    async fn delete(&self, id: &str) -> Result<()>;

    /// Returns one page of pipelines and the number matching before paging
    async fn list(&self, scope: ListScope<'_>, query: &ListQuery) -> Result<PipelinesResponse>;

    /// Pipelines per owner, highest count first
    async fn pipeline_user_count(&self) -> Result<Vec<PipelineUserCount>>;

    /// Pipelines per operator id, highest count first
    async fn operator_usage(&self) -> Result<Vec<OperatorUsage>>;
}

/// Compiles the name filter of a listing
pub(crate) fn search_regex(query: &ListQuery) -> Result<Option<Regex>> {
    query
        .search_regex()
        .map_err(|e| RepositoryError::InvalidQuery(format!("invalid search pattern: {}", e)))
}

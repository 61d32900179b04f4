//! Pipeline DTOs for the HTTP API

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::Pipeline;

/// Returned by save and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub id: String,
}

/// A page of pipelines plus the number of pipelines matching the filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelinesResponse {
    pub data: Vec<Pipeline>,
    pub total: i64,
}

/// Plain status message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Outcome of one permission reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileReport {
    /// Pipelines whose permission record was inspected
    pub checked: u64,
    /// Permission records created or rewritten
    pub updated: u64,
    /// Orphaned permission records removed
    pub removed: u64,
    /// False when the pass was cancelled before the end
    pub completed: bool,
}

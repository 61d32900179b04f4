//! Aggregate statistics over stored pipelines

use serde::{Deserialize, Serialize};

/// Number of pipelines owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineUserCount {
    pub user_id: String,
    pub count: i64,
}

/// How many pipelines reference an operator, and which ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorUsage {
    pub operator_id: String,
    pub count: i64,
    pub pipeline_ids: Vec<String>,
}

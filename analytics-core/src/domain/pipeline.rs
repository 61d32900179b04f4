//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Analytics pipeline definition
///
/// A graph of operators with topic bindings. The owner (`user_id`), `id` and
/// `created_at` are assigned by the registry and never taken from client input
/// on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub description: String,
    pub flow_id: String,
    pub image: String,
    pub window_time: i64,
    pub merge_strategy: String,
    pub consume_all_messages: bool,
    pub metrics: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "UserId", alias = "userId")]
    pub user_id: String,
    pub operators: Vec<Operator>,
}

impl Pipeline {
    /// Operator ids referenced by this pipeline, in graph order
    pub fn operator_ids(&self) -> impl Iterator<Item = &str> {
        self.operators.iter().map(|op| op.id.as_str())
    }
}

/// A processing node inside a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Operator {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<Uuid>,
    pub image_id: String,
    pub deployment_type: String,
    pub operator_id: String,
    pub config: HashMap<String, String>,
    pub output_topic: String,
    pub input_topics: Vec<InputTopic>,
    pub input_selections: Vec<InputSelection>,
    pub persist_data: bool,
    pub cost: u32,
    #[serde(rename = "upstream")]
    pub upstream_config: UpstreamConfig,
    #[serde(rename = "downstream")]
    pub downstream_config: DownstreamConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    #[serde(rename = "Enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    #[serde(rename = "Enabled")]
    pub enabled: bool,
    #[serde(rename = "InstanceID")]
    pub instance_id: String,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
}

/// Topic an operator consumes, with its field mappings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputTopic {
    pub name: String,
    pub filter_type: String,
    pub filter_value: String,
    pub mappings: Vec<Mapping>,
}

/// Maps a source field of the topic message onto an operator input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mapping {
    pub dest: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputSelection {
    /// Name of the input topic mapping this selection belongs to
    pub input_name: String,
    pub aspect_id: String,
    pub function_id: String,
    pub characteristic_ids: Vec<String>,
    /// Either a device or a device group
    pub selectable_id: String,
}

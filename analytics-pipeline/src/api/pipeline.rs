//! Pipeline API Handlers
//!
//! HTTP endpoints for a caller's own (or shared) pipelines.

use analytics_core::domain::pipeline::Pipeline;
use analytics_core::dto::pipeline::{PipelineResponse, PipelinesResponse};
use analytics_core::query::{ListParams, ListQuery};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::identity::Identity;
use crate::service::Registry;

/// POST /pipeline
/// Store a new pipeline owned by the caller
pub async fn save_pipeline(
    State(registry): State<Arc<Registry>>,
    identity: Identity,
    payload: Result<Json<Pipeline>, JsonRejection>,
) -> ApiResult<Json<PipelineResponse>> {
    let Json(pipeline) = payload?;
    tracing::debug!("Saving pipeline '{}' for {}", pipeline.name, identity.user_id);

    let id = registry.save_pipeline(pipeline, &identity.user_id).await?;

    Ok(Json(PipelineResponse { id }))
}

/// PUT /pipeline
/// Replace an existing pipeline
pub async fn update_pipeline(
    State(registry): State<Arc<Registry>>,
    identity: Identity,
    payload: Result<Json<Pipeline>, JsonRejection>,
) -> ApiResult<Json<PipelineResponse>> {
    let Json(pipeline) = payload?;

    let id = registry
        .update_pipeline(pipeline, &identity.user_id, &identity.token)
        .await?;

    Ok(Json(PipelineResponse { id }))
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(registry): State<Arc<Registry>>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = registry
        .get_pipeline(&id, &identity.user_id, &identity.token)
        .await?;

    Ok(Json(pipeline))
}

/// DELETE /pipeline/{id}
pub async fn delete_pipeline(
    State(registry): State<Arc<Registry>>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    registry
        .delete_pipeline(&id, &identity.user_id, &identity.token)
        .await?;

    Ok(StatusCode::OK)
}

/// GET /pipeline
/// List pipelines the caller owns or may read
pub async fn list_pipelines(
    State(registry): State<Arc<Registry>>,
    identity: Identity,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<PipelinesResponse>> {
    let query = ListQuery::from(params);

    let pipelines = registry
        .list_pipelines(&identity.user_id, &query, &identity.token)
        .await?;

    Ok(Json(pipelines))
}

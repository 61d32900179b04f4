//! Admin API Handlers
//!
//! Routes reserved to callers with the admin role. Per-pipeline permissions
//! are not consulted here.

use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::{PipelinesResponse, ReconcileReport};
use analytics_core::query::{ListParams, ListQuery};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiResult;
use crate::api::identity::AdminIdentity;
use crate::service::Registry;

/// GET /admin/pipeline
pub async fn list_pipelines(
    State(registry): State<Arc<Registry>>,
    AdminIdentity(identity): AdminIdentity,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<PipelinesResponse>> {
    tracing::debug!("Admin {} listing all pipelines", identity.user_id);

    let pipelines = registry
        .list_pipelines_admin(&ListQuery::from(params))
        .await?;

    Ok(Json(pipelines))
}

/// DELETE /admin/pipeline/{id}
pub async fn delete_pipeline(
    State(registry): State<Arc<Registry>>,
    AdminIdentity(identity): AdminIdentity,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    tracing::info!("Admin {} deleting pipeline {}", identity.user_id, id);

    registry.delete_pipeline_admin(&id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/pipeline/statistics/usercount
pub async fn pipeline_user_count(
    State(registry): State<Arc<Registry>>,
    _admin: AdminIdentity,
) -> ApiResult<Json<Vec<PipelineUserCount>>> {
    Ok(Json(registry.pipeline_user_count().await?))
}

/// GET /admin/pipeline/statistics/operatorusage
pub async fn operator_usage(
    State(registry): State<Arc<Registry>>,
    _admin: AdminIdentity,
) -> ApiResult<Json<Vec<OperatorUsage>>> {
    Ok(Json(registry.operator_usage().await?))
}

/// POST /admin/pipeline/permissions/reconcile
/// Run one permission reconciliation pass and report what changed
pub async fn reconcile_permissions(
    State(registry): State<Arc<Registry>>,
    AdminIdentity(identity): AdminIdentity,
) -> ApiResult<Json<ReconcileReport>> {
    tracing::info!("Permission reconciliation requested by {}", identity.user_id);

    let report = registry
        .reconcile_permissions(&CancellationToken::new())
        .await?;

    Ok(Json(report))
}

//! Administrative API endpoints
//!
//! The caller must carry the admin role, e.g. via
//! [`PipelineClient::with_roles`].

use crate::PipelineClient;
use crate::error::Result;
use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::{PipelinesResponse, ReconcileReport};
use analytics_core::query::ListQuery;
use reqwest::Method;

impl PipelineClient {
    /// List every pipeline regardless of owner
    pub async fn list_pipelines_admin(&self, query: &ListQuery) -> Result<PipelinesResponse> {
        let response = self
            .request(Method::GET, "/admin/pipeline")
            .query(&query.to_params())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete any pipeline and its permission record
    pub async fn delete_pipeline_admin(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/admin/pipeline/{}", id))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Number of pipelines per owner, highest first
    pub async fn pipeline_user_count(&self) -> Result<Vec<PipelineUserCount>> {
        let response = self
            .request(Method::GET, "/admin/pipeline/statistics/usercount")
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Number of pipelines per operator, highest first
    pub async fn operator_usage(&self) -> Result<Vec<OperatorUsage>> {
        let response = self
            .request(Method::GET, "/admin/pipeline/statistics/operatorusage")
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Run a permission reconciliation pass on the server
    pub async fn reconcile_permissions(&self) -> Result<ReconcileReport> {
        let response = self
            .request(Method::POST, "/admin/pipeline/permissions/reconcile")
            .send()
            .await?;

        self.handle_response(response).await
    }
}

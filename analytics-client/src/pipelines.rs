//! Pipeline-related API endpoints

use crate::PipelineClient;
use crate::error::Result;
use analytics_core::domain::pipeline::Pipeline;
use analytics_core::dto::pipeline::{PipelineResponse, PipelinesResponse};
use analytics_core::query::ListQuery;
use reqwest::Method;

impl PipelineClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Store a new pipeline owned by the calling user
    ///
    /// Any `id`, owner or timestamps in `pipeline` are replaced by the registry.
    ///
    /// # Returns
    /// The id assigned to the pipeline
    ///
    /// # Example
    /// ```no_run
    /// # use analytics_client::PipelineClient;
    /// # use analytics_core::domain::pipeline::Pipeline;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = PipelineClient::new("http://localhost:8000").with_user("u1");
    /// let id = client.save_pipeline(&Pipeline {
    ///     name: "my-pipeline".to_string(),
    ///     ..Default::default()
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn save_pipeline(&self, pipeline: &Pipeline) -> Result<String> {
        let response = self
            .request(Method::POST, "/pipeline")
            .json(pipeline)
            .send()
            .await?;

        let created: PipelineResponse = self.handle_response(response).await?;
        Ok(created.id)
    }

    /// Replace the pipeline with the same `id`
    ///
    /// Requires write permission on the pipeline.
    pub async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<String> {
        let response = self
            .request(Method::PUT, "/pipeline")
            .json(pipeline)
            .send()
            .await?;

        let updated: PipelineResponse = self.handle_response(response).await?;
        Ok(updated.id)
    }

    /// Get a pipeline by id
    ///
    /// Requires read permission on the pipeline.
    pub async fn get_pipeline(&self, id: &str) -> Result<Pipeline> {
        let response = self
            .request(Method::GET, &format!("/pipeline/{}", id))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete a pipeline
    ///
    /// Requires administrate permission on the pipeline.
    pub async fn delete_pipeline(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("/pipeline/{}", id))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// List pipelines the caller owns or may read
    pub async fn list_pipelines(&self, query: &ListQuery) -> Result<PipelinesResponse> {
        let response = self
            .request(Method::GET, "/pipeline")
            .query(&query.to_params())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List pipelines as seen by another user
    ///
    /// Only honored when the caller holds the admin role.
    pub async fn list_pipelines_for(
        &self,
        user_id: &str,
        query: &ListQuery,
    ) -> Result<PipelinesResponse> {
        let mut params = query.to_params();
        params.push(("for_user", user_id.to_string()));

        let response = self
            .request(Method::GET, "/pipeline")
            .query(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

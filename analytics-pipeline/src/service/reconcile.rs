//! Permission reconciliation
//!
//! Re-derives the permission store from the document store: every stored
//! pipeline gets a record in which its owner holds all capabilities, and
//! records whose pipeline no longer exists are removed.

use analytics_core::dto::pipeline::ReconcileReport;
use analytics_core::query::ListQuery;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use super::registry::{PIPELINE_TOPIC, Registry, RegistryError, Result};
use crate::permission::PermissionClient;
use crate::repository::{ListScope, PipelineRepository, RepositoryError};

impl Registry {
    /// Runs one reconciliation pass
    ///
    /// The pass stops between items once `cancel` fires and then reports
    /// `completed = false`. Unchanged records are not rewritten.
    pub async fn reconcile_permissions(&self, cancel: &CancellationToken) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let pipelines = self
            .repository
            .list(ListScope::Admin, &ListQuery::default())
            .await?
            .data;

        for pipeline in &pipelines {
            if cancel.is_cancelled() {
                tracing::warn!("Permission reconciliation cancelled: {:?}", report);
                return Ok(report);
            }
            report.checked += 1;

            let current = self
                .permissions
                .get_resource(&self.admin_token, PIPELINE_TOPIC, &pipeline.id)
                .await?
                .map(|resource| resource.permissions);

            let mut merged = current.clone().unwrap_or_default();
            merged.grant_owner(&pipeline.user_id);
            if current.as_ref() == Some(&merged) {
                continue;
            }

            self.permissions
                .set_permission(&self.admin_token, PIPELINE_TOPIC, &pipeline.id, &merged)
                .await?;
            report.updated += 1;
            tracing::info!(
                "Permissions repaired for pipeline {} (owner {})",
                pipeline.id,
                pipeline.user_id
            );
        }

        let known: HashSet<&str> = pipelines.iter().map(|p| p.id.as_str()).collect();
        let resources = self
            .permissions
            .list_resources(&self.admin_token, PIPELINE_TOPIC)
            .await?;

        for resource in resources {
            if known.contains(resource.id.as_str()) {
                continue;
            }
            if cancel.is_cancelled() {
                tracing::warn!("Permission reconciliation cancelled: {:?}", report);
                return Ok(report);
            }

            // created after the scan started
            match self.repository.find(&resource.id).await {
                Ok(_) => continue,
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(RegistryError::from(e)),
            }

            self.permissions
                .remove_resource(&self.admin_token, PIPELINE_TOPIC, &resource.id)
                .await?;
            report.removed += 1;
            tracing::info!("Orphaned permissions removed for pipeline {}", resource.id);
        }

        report.completed = true;
        tracing::info!(
            "Permission reconciliation finished: {} checked, {} updated, {} removed",
            report.checked,
            report.updated,
            report.removed
        );

        Ok(report)
    }
}

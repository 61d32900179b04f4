//! Pipeline Registry
//!
//! Create, read, update and delete of pipeline records, gated by the
//! capabilities the permission service grants the caller. Saves and deletes
//! touch both stores without a transaction; drift between them is repaired by
//! [`Registry::reconcile_permissions`].

use analytics_core::domain::permission::{Capability, PermissionsMap, ResourcePermissions, Topic};
use analytics_core::domain::pipeline::Pipeline;
use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::PipelinesResponse;
use analytics_core::query::ListQuery;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::ADMIN_ROLE;
use crate::permission::{PermissionClient, PermissionError};
use crate::repository::{ListScope, PipelineRepository, RepositoryError};

/// Permission service topic holding one resource per pipeline
pub const PIPELINE_TOPIC: &str = "analytics-pipelines";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("pipeline {0} not found")]
    NotFound(String),

    #[error("missing {capability} permission on pipeline {id}")]
    Forbidden { id: String, capability: Capability },

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[source] RepositoryError),

    #[error("permission service error: {0}")]
    PermissionService(#[from] PermissionError),
}

impl From<RepositoryError> for RegistryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => RegistryError::NotFound(id),
            RepositoryError::InvalidQuery(message) => RegistryError::Validation(message),
            other => RegistryError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

pub struct Registry {
    pub(super) repository: Arc<dyn PipelineRepository>,
    pub(super) permissions: Arc<dyn PermissionClient>,
    pub(super) admin_token: String,
}

impl Registry {
    /// Builds the registry and registers the pipeline topic
    pub async fn new(
        repository: Arc<dyn PipelineRepository>,
        permissions: Arc<dyn PermissionClient>,
        admin_token: impl Into<String>,
    ) -> Result<Self> {
        let registry = Self {
            repository,
            permissions,
            admin_token: admin_token.into(),
        };

        registry
            .permissions
            .ensure_topic(&registry.admin_token, &pipeline_topic())
            .await?;
        tracing::debug!("Permission topic registered: {}", PIPELINE_TOPIC);

        Ok(registry)
    }

    /// Stores a new pipeline owned by `user_id` and returns its id
    pub async fn save_pipeline(&self, mut pipeline: Pipeline, user_id: &str) -> Result<String> {
        let now = Utc::now();
        pipeline.id = Uuid::new_v4().to_string();
        pipeline.user_id = user_id.to_string();
        pipeline.created_at = now;
        pipeline.updated_at = now;

        self.repository.insert(&pipeline).await?;

        // the document is already stored if this fails; reconciliation repairs it
        self.permissions
            .set_permission(
                &self.admin_token,
                PIPELINE_TOPIC,
                &pipeline.id,
                &ResourcePermissions::owned_by(user_id),
            )
            .await?;

        tracing::info!("Pipeline created: {} ({}) by {}", pipeline.name, pipeline.id, user_id);

        Ok(pipeline.id)
    }

    /// Replaces the body of an existing pipeline
    ///
    /// Owner and creation time are kept from the stored record whatever the
    /// payload says.
    pub async fn update_pipeline(
        &self,
        mut pipeline: Pipeline,
        user_id: &str,
        auth: &str,
    ) -> Result<String> {
        self.require(auth, &pipeline.id, Capability::Write).await?;

        let existing = self.repository.find(&pipeline.id).await?;
        pipeline.user_id = existing.user_id;
        pipeline.created_at = existing.created_at;
        pipeline.updated_at = next_update(existing.updated_at);

        self.repository.replace(&pipeline).await?;

        tracing::info!("Pipeline updated: {} by {}", pipeline.id, user_id);

        Ok(pipeline.id)
    }

    pub async fn get_pipeline(&self, id: &str, user_id: &str, auth: &str) -> Result<Pipeline> {
        self.require(auth, id, Capability::Read).await?;

        let pipeline = self.repository.find(id).await?;
        tracing::debug!("Pipeline {} read by {}", id, user_id);

        Ok(pipeline)
    }

    /// Deletes a pipeline and its permission record
    pub async fn delete_pipeline(&self, id: &str, user_id: &str, auth: &str) -> Result<()> {
        self.require(auth, id, Capability::Administrate).await?;

        self.repository.delete(id).await?;
        self.permissions
            .remove_resource(&self.admin_token, PIPELINE_TOPIC, id)
            .await?;

        tracing::info!("Pipeline deleted: {} by {}", id, user_id);

        Ok(())
    }

    /// Pipelines the caller owns or may read
    pub async fn list_pipelines(
        &self,
        user_id: &str,
        query: &ListQuery,
        auth: &str,
    ) -> Result<PipelinesResponse> {
        validate_query(query)?;

        let accessible_ids = self
            .permissions
            .list_accessible_resource_ids(auth, PIPELINE_TOPIC, Capability::Read)
            .await?;
        tracing::debug!(
            "Listing pipelines for {} ({} granted)",
            user_id,
            accessible_ids.len()
        );

        let scope = ListScope::User {
            user_id,
            accessible_ids: &accessible_ids,
        };
        Ok(self.repository.list(scope, query).await?)
    }

    /// Every pipeline, without permission checks
    pub async fn list_pipelines_admin(&self, query: &ListQuery) -> Result<PipelinesResponse> {
        validate_query(query)?;
        Ok(self.repository.list(ListScope::Admin, query).await?)
    }

    /// Deletes any pipeline, without permission checks
    pub async fn delete_pipeline_admin(&self, id: &str) -> Result<()> {
        self.repository.delete(id).await?;
        self.permissions
            .remove_resource(&self.admin_token, PIPELINE_TOPIC, id)
            .await?;

        tracing::info!("Pipeline deleted by administrator: {}", id);

        Ok(())
    }

    pub async fn pipeline_user_count(&self) -> Result<Vec<PipelineUserCount>> {
        Ok(self.repository.pipeline_user_count().await?)
    }

    pub async fn operator_usage(&self) -> Result<Vec<OperatorUsage>> {
        Ok(self.repository.operator_usage().await?)
    }

    async fn require(&self, auth: &str, id: &str, capability: Capability) -> Result<()> {
        let allowed = self
            .permissions
            .check_permission(auth, PIPELINE_TOPIC, id, capability)
            .await?;

        if !allowed {
            return Err(RegistryError::Forbidden {
                id: id.to_string(),
                capability,
            });
        }

        Ok(())
    }
}

/// Topic definition: administrators hold every capability on every pipeline
fn pipeline_topic() -> Topic {
    let mut topic = Topic {
        id: PIPELINE_TOPIC.to_string(),
        ..Default::default()
    };
    topic
        .default_permissions
        .role_permissions
        .insert(ADMIN_ROLE.to_string(), PermissionsMap::all());
    topic
}

/// Update timestamp strictly after `previous`, at microsecond resolution
fn next_update(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + TimeDelta::microseconds(1))
}

fn validate_query(query: &ListQuery) -> Result<()> {
    query
        .search_regex()
        .map(|_| ())
        .map_err(|e| RegistryError::Validation(format!("invalid search pattern: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::test_token;
    use crate::permission::InMemoryPermissionClient;
    use crate::repository::InMemoryPipelineRepository;
    use analytics_core::domain::permission::{Resource, ResourcePermissions};
    use analytics_core::domain::pipeline::Operator;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub(crate) const ADMIN_TOKEN: &str = "admin-secret";

    /// Permission client whose writes or access checks can be switched to fail
    pub(crate) struct FlakyPermissions {
        pub(crate) inner: InMemoryPermissionClient,
        pub(crate) fail_writes: AtomicBool,
        pub(crate) fail_checks: AtomicBool,
    }

    impl FlakyPermissions {
        pub(crate) fn new() -> Self {
            Self {
                inner: InMemoryPermissionClient::new(ADMIN_TOKEN),
                fail_writes: AtomicBool::new(false),
                fail_checks: AtomicBool::new(false),
            }
        }

        fn check_checks(&self) -> crate::permission::Result<()> {
            if self.fail_checks.load(Ordering::SeqCst) {
                return Err(PermissionError::Parse("garbled answer".to_string()));
            }
            Ok(())
        }

        fn check_writes(&self) -> crate::permission::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PermissionError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PermissionClient for FlakyPermissions {
        async fn ensure_topic(&self, token: &str, topic: &Topic) -> crate::permission::Result<()> {
            self.inner.ensure_topic(token, topic).await
        }

        async fn check_permission(
            &self,
            token: &str,
            topic: &str,
            id: &str,
            capability: Capability,
        ) -> crate::permission::Result<bool> {
            self.check_checks()?;
            self.inner.check_permission(token, topic, id, capability).await
        }

        async fn list_accessible_resource_ids(
            &self,
            token: &str,
            topic: &str,
            capability: Capability,
        ) -> crate::permission::Result<Vec<String>> {
            self.check_checks()?;
            self.inner
                .list_accessible_resource_ids(token, topic, capability)
                .await
        }

        async fn get_resource(
            &self,
            token: &str,
            topic: &str,
            id: &str,
        ) -> crate::permission::Result<Option<Resource>> {
            self.inner.get_resource(token, topic, id).await
        }

        async fn list_resources(
            &self,
            token: &str,
            topic: &str,
        ) -> crate::permission::Result<Vec<Resource>> {
            self.inner.list_resources(token, topic).await
        }

        async fn set_permission(
            &self,
            token: &str,
            topic: &str,
            id: &str,
            permissions: &ResourcePermissions,
        ) -> crate::permission::Result<()> {
            self.check_writes()?;
            self.inner.set_permission(token, topic, id, permissions).await
        }

        async fn remove_resource(
            &self,
            token: &str,
            topic: &str,
            id: &str,
        ) -> crate::permission::Result<()> {
            self.check_writes()?;
            self.inner.remove_resource(token, topic, id).await
        }
    }

    /// Store that refuses every insert
    struct RejectingInserts(InMemoryPipelineRepository);

    #[async_trait]
    impl PipelineRepository for RejectingInserts {
        async fn insert(&self, pipeline: &Pipeline) -> crate::repository::Result<()> {
            Err(RepositoryError::Duplicate(pipeline.id.clone()))
        }

        async fn replace(&self, pipeline: &Pipeline) -> crate::repository::Result<()> {
            self.0.replace(pipeline).await
        }

        async fn find(&self, id: &str) -> crate::repository::Result<Pipeline> {
            self.0.find(id).await
        }

        async fn delete(&self, id: &str) -> crate::repository::Result<()> {
            self.0.delete(id).await
        }

        async fn list(
            &self,
            scope: ListScope<'_>,
            query: &ListQuery,
        ) -> crate::repository::Result<PipelinesResponse> {
            self.0.list(scope, query).await
        }

        async fn pipeline_user_count(&self) -> crate::repository::Result<Vec<PipelineUserCount>> {
            self.0.pipeline_user_count().await
        }

        async fn operator_usage(&self) -> crate::repository::Result<Vec<OperatorUsage>> {
            self.0.operator_usage().await
        }
    }

    pub(crate) struct Fixture {
        pub(crate) registry: Registry,
        pub(crate) repository: Arc<InMemoryPipelineRepository>,
        pub(crate) permissions: Arc<FlakyPermissions>,
    }

    pub(crate) async fn fixture() -> Fixture {
        let repository = Arc::new(InMemoryPipelineRepository::new());
        let permissions = Arc::new(FlakyPermissions::new());
        let registry = Registry::new(repository.clone(), permissions.clone(), ADMIN_TOKEN)
            .await
            .unwrap();

        Fixture {
            registry,
            repository,
            permissions,
        }
    }

    pub(crate) fn sample(name: &str) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            description: "counts events".to_string(),
            flow_id: "flow-1".to_string(),
            window_time: 30,
            metrics: true,
            operators: vec![Operator {
                id: "op-1".to_string(),
                name: "adder".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_then_get_by_creator() {
        let f = fixture().await;

        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        let stored = f.registry.get_pipeline(&id, "u1", "u1").await.unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(stored.id, id);
        assert_eq!(stored.user_id, "u1");
        assert_eq!(stored.created_at, stored.updated_at);
        assert_eq!(
            stored,
            Pipeline {
                id: id.clone(),
                user_id: "u1".to_string(),
                created_at: stored.created_at,
                updated_at: stored.updated_at,
                ..sample("p1")
            }
        );
    }

    #[tokio::test]
    async fn test_save_ignores_supplied_identity() {
        let f = fixture().await;
        let mut pipeline = sample("p1");
        pipeline.id = "chosen".to_string();
        pipeline.user_id = "someone-else".to_string();

        let id = f.registry.save_pipeline(pipeline, "u1").await.unwrap();

        assert_ne!(id, "chosen");
        assert_eq!(f.repository.find(&id).await.unwrap().user_id, "u1");
    }

    #[tokio::test]
    async fn test_get_without_access_is_forbidden() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();

        let result = f.registry.get_pipeline(&id, "u2", "u2").await;

        assert!(matches!(
            result,
            Err(RegistryError::Forbidden {
                capability: Capability::Read,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_admin_role_reads_any_pipeline() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        let token = test_token("boss", &[ADMIN_ROLE]);

        let stored = f.registry.get_pipeline(&id, "boss", &token).await.unwrap();

        assert_eq!(stored.user_id, "u1");
    }

    #[tokio::test]
    async fn test_update_preserves_identity_fields() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        let before = f.repository.find(&id).await.unwrap();

        let mut change = sample("renamed");
        change.id = id.clone();
        change.user_id = "thief".to_string();
        change.created_at = Utc::now() + TimeDelta::days(1);

        let updated_id = f.registry.update_pipeline(change, "u1", "u1").await.unwrap();
        let after = f.repository.find(&id).await.unwrap();

        assert_eq!(updated_id, id);
        assert_eq!(after.name, "renamed");
        assert_eq!(after.user_id, "u1");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn test_update_timestamp_strictly_increases() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();

        let mut previous = f.repository.find(&id).await.unwrap().updated_at;
        for _ in 0..3 {
            let mut change = sample("p1");
            change.id = id.clone();
            f.registry.update_pipeline(change, "u1", "u1").await.unwrap();

            let current = f.repository.find(&id).await.unwrap().updated_at;
            assert!(current > previous);
            previous = current;
        }
    }

    #[tokio::test]
    async fn test_update_by_stranger_changes_nothing() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        let before = f.repository.find(&id).await.unwrap();

        let mut change = sample("hijacked");
        change.id = id.clone();
        let result = f.registry.update_pipeline(change, "u2", "u2").await;

        assert!(matches!(result, Err(RegistryError::Forbidden { .. })));
        assert_eq!(f.repository.find(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_of_out_of_band_deleted_pipeline() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        f.repository.delete(&id).await.unwrap();

        let mut change = sample("p1");
        change.id = id.clone();
        let result = f.registry.update_pipeline(change, "u1", "u1").await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_document_and_permissions() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();

        f.registry.delete_pipeline(&id, "u1", "u1").await.unwrap();

        assert!(f.repository.find(&id).await.is_err());
        assert!(
            f.permissions
                .get_resource(ADMIN_TOKEN, PIPELINE_TOPIC, &id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_requires_administrate() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        let mut shared = ResourcePermissions::owned_by("u1");
        shared.user_permissions.insert(
            "u2".to_string(),
            PermissionsMap {
                read: true,
                write: true,
                ..Default::default()
            },
        );
        f.permissions
            .set_permission(ADMIN_TOKEN, PIPELINE_TOPIC, &id, &shared)
            .await
            .unwrap();

        let result = f.registry.delete_pipeline(&id, "u2", "u2").await;

        assert!(matches!(
            result,
            Err(RegistryError::Forbidden {
                capability: Capability::Administrate,
                ..
            })
        ));
        assert!(f.repository.find(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_unions_owned_and_granted() {
        let f = fixture().await;
        let own = f.registry.save_pipeline(sample("mine"), "u1").await.unwrap();
        let shared = f.registry.save_pipeline(sample("shared"), "u2").await.unwrap();
        f.registry.save_pipeline(sample("private"), "u2").await.unwrap();

        let mut permissions = ResourcePermissions::owned_by("u2");
        permissions.user_permissions.insert(
            "u1".to_string(),
            PermissionsMap {
                read: true,
                ..Default::default()
            },
        );
        f.permissions
            .set_permission(ADMIN_TOKEN, PIPELINE_TOPIC, &shared, &permissions)
            .await
            .unwrap();

        let response = f
            .registry
            .list_pipelines("u1", &ListQuery::default(), "u1")
            .await
            .unwrap();
        let ids: Vec<String> = response.data.into_iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![own, shared]);
        assert_eq!(response.total, 2);

        let response = f
            .registry
            .list_pipelines("u3", &ListQuery::default(), "u3")
            .await
            .unwrap();
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_list_rejects_invalid_search() {
        let f = fixture().await;

        let result = f
            .registry
            .list_pipelines("u1", &ListQuery::default().with_search("(("), "u1")
            .await;

        assert!(matches!(result, Err(RegistryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_admin_list_and_delete() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("a"), "u1").await.unwrap();
        f.registry.save_pipeline(sample("b"), "u2").await.unwrap();

        let all = f
            .registry
            .list_pipelines_admin(&ListQuery::default())
            .await
            .unwrap();
        assert_eq!(all.total, 2);

        f.registry.delete_pipeline_admin(&id).await.unwrap();

        assert!(matches!(
            f.registry.delete_pipeline_admin(&id).await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(
            f.permissions
                .get_resource(ADMIN_TOKEN, PIPELINE_TOPIC, &id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_save_surfaces_permission_failure_after_insert() {
        let f = fixture().await;
        f.permissions.fail_writes.store(true, Ordering::SeqCst);

        let result = f.registry.save_pipeline(sample("p1"), "u1").await;

        assert!(matches!(result, Err(RegistryError::PermissionService(_))));
        let stored = f
            .registry
            .list_pipelines_admin(&ListQuery::default())
            .await
            .unwrap();
        assert_eq!(stored.total, 1);
    }

    #[tokio::test]
    async fn test_delete_surfaces_permission_failure_after_delete() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        f.permissions.fail_writes.store(true, Ordering::SeqCst);

        let result = f.registry.delete_pipeline(&id, "u1", "u1").await;

        assert!(matches!(result, Err(RegistryError::PermissionService(_))));
        assert!(f.repository.find(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_insert_registers_no_permissions() {
        let permissions = Arc::new(FlakyPermissions::new());
        let registry = Registry::new(
            Arc::new(RejectingInserts(InMemoryPipelineRepository::new())),
            permissions.clone(),
            ADMIN_TOKEN,
        )
        .await
        .unwrap();

        let result = registry.save_pipeline(sample("p1"), "u1").await;

        assert!(matches!(
            result,
            Err(RegistryError::Storage(RepositoryError::Duplicate(_)))
        ));
        let resources = permissions
            .list_resources(ADMIN_TOKEN, PIPELINE_TOPIC)
            .await
            .unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_failed_access_check_is_not_a_denial() {
        let f = fixture().await;
        let id = f.registry.save_pipeline(sample("p1"), "u1").await.unwrap();
        f.permissions.fail_checks.store(true, Ordering::SeqCst);

        let get = f.registry.get_pipeline(&id, "u1", "u1").await;
        assert!(matches!(get, Err(RegistryError::PermissionService(_))));

        let mut change = sample("renamed");
        change.id = id.clone();
        let update = f.registry.update_pipeline(change, "u1", "u1").await;
        assert!(matches!(update, Err(RegistryError::PermissionService(_))));

        let delete = f.registry.delete_pipeline(&id, "u1", "u1").await;
        assert!(matches!(delete, Err(RegistryError::PermissionService(_))));

        let list = f
            .registry
            .list_pipelines("u1", &ListQuery::default(), "u1")
            .await;
        assert!(matches!(list, Err(RegistryError::PermissionService(_))));

        let stored = f.repository.find(&id).await.unwrap();
        assert_eq!(stored.name, "p1");
    }

    #[tokio::test]
    async fn test_statistics_are_forwarded() {
        let f = fixture().await;
        f.registry.save_pipeline(sample("a"), "u1").await.unwrap();
        f.registry.save_pipeline(sample("b"), "u1").await.unwrap();

        let users = f.registry.pipeline_user_count().await.unwrap();
        let operators = f.registry.operator_usage().await.unwrap();

        assert_eq!(
            users,
            vec![PipelineUserCount {
                user_id: "u1".to_string(),
                count: 2
            }]
        );
        assert_eq!(operators.len(), 1);
        assert_eq!(operators[0].operator_id, "op-1");
        assert_eq!(operators[0].count, 2);
    }

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            RegistryError::from(RepositoryError::NotFound("x".to_string())),
            RegistryError::NotFound(_)
        ));
        assert!(matches!(
            RegistryError::from(RepositoryError::InvalidQuery("bad".to_string())),
            RegistryError::Validation(_)
        ));
        assert!(matches!(
            RegistryError::from(RepositoryError::Duplicate("x".to_string())),
            RegistryError::Storage(_)
        ));
    }
}

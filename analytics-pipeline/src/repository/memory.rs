//! In-memory pipeline repository
//!
//! Keeps pipelines in insertion order, which is the default order of a
//! listing without `order`.

use analytics_core::domain::pipeline::Pipeline;
use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::PipelinesResponse;
use analytics_core::query::{ListQuery, SortDirection, SortField};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::{ListScope, PipelineRepository, RepositoryError, Result, search_regex};

#[derive(Debug, Default)]
pub struct InMemoryPipelineRepository {
    pipelines: RwLock<Vec<Pipeline>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn insert(&self, pipeline: &Pipeline) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        if pipelines.iter().any(|p| p.id == pipeline.id) {
            return Err(RepositoryError::Duplicate(pipeline.id.clone()));
        }
        pipelines.push(pipeline.clone());
        Ok(())
    }

    async fn replace(&self, pipeline: &Pipeline) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        if let Some(existing) = pipelines.iter_mut().find(|p| p.id == pipeline.id) {
            *existing = pipeline.clone();
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Pipeline> {
        self.pipelines
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        let position = pipelines
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        pipelines.remove(position);
        Ok(())
    }

    async fn list(&self, scope: ListScope<'_>, query: &ListQuery) -> Result<PipelinesResponse> {
        let search = search_regex(query)?;

        let mut matched: Vec<Pipeline> = self
            .pipelines
            .read()
            .await
            .iter()
            .filter(|p| scope.includes(p))
            .filter(|p| search.as_ref().is_none_or(|r| r.is_match(&p.name)))
            .cloned()
            .collect();
        let total = matched.len() as i64;

        if let Some(order) = query.order {
            matched.sort_by(|a, b| {
                let ordering = compare(a, b, order.field);
                match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset = query.offset.map_or(0, |o| usize::try_from(o).unwrap_or(usize::MAX));
        let limit = query.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let data = matched.into_iter().skip(offset).take(limit).collect();

        Ok(PipelinesResponse { data, total })
    }

    async fn pipeline_user_count(&self) -> Result<Vec<PipelineUserCount>> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for pipeline in self.pipelines.read().await.iter() {
            *counts.entry(pipeline.user_id.clone()).or_default() += 1;
        }

        let mut statistics: Vec<PipelineUserCount> = counts
            .into_iter()
            .map(|(user_id, count)| PipelineUserCount { user_id, count })
            .collect();
        statistics.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user_id.cmp(&b.user_id)));

        Ok(statistics)
    }

    async fn operator_usage(&self) -> Result<Vec<OperatorUsage>> {
        let mut usage: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for pipeline in self.pipelines.read().await.iter() {
            for operator_id in pipeline.operator_ids() {
                usage
                    .entry(operator_id.to_string())
                    .or_default()
                    .insert(pipeline.id.clone());
            }
        }

        let mut statistics: Vec<OperatorUsage> = usage
            .into_iter()
            .map(|(operator_id, ids)| OperatorUsage {
                operator_id,
                count: ids.len() as i64,
                pipeline_ids: ids.into_iter().collect(),
            })
            .collect();
        // stable sort keeps operator ids ascending within equal counts
        statistics.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(statistics)
    }
}

fn compare(a: &Pipeline, b: &Pipeline, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Id => a.id.cmp(&b.id),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_core::domain::pipeline::Operator;
    use analytics_core::query::Order;
    use pretty_assertions::assert_eq;

    fn pipeline(id: &str, user_id: &str, name: &str) -> Pipeline {
        Pipeline {
            id: id.to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn with_operators(mut pipeline: Pipeline, operator_ids: &[&str]) -> Pipeline {
        pipeline.operators = operator_ids
            .iter()
            .map(|id| Operator {
                id: id.to_string(),
                ..Default::default()
            })
            .collect();
        pipeline
    }

    async fn seeded() -> InMemoryPipelineRepository {
        let repo = InMemoryPipelineRepository::new();
        for p in [
            pipeline("p1", "u1", "beta"),
            pipeline("p2", "u1", "Alpha"),
            pipeline("p3", "u2", "gamma"),
            pipeline("p4", "u2", "alphabet"),
        ] {
            repo.insert(&p).await.unwrap();
        }
        repo
    }

    fn ids(response: &PipelinesResponse) -> Vec<&str> {
        response.data.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_find_and_delete_missing() {
        let repo = InMemoryPipelineRepository::new();

        assert!(matches!(
            repo.find("nope").await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete("nope").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_duplicate_id() {
        let repo = InMemoryPipelineRepository::new();
        repo.insert(&pipeline("p1", "u1", "a")).await.unwrap();

        assert!(matches!(
            repo.insert(&pipeline("p1", "u2", "b")).await,
            Err(RepositoryError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_missing_is_noop() {
        let repo = InMemoryPipelineRepository::new();
        repo.replace(&pipeline("p1", "u1", "a")).await.unwrap();

        assert!(repo.find("p1").await.is_err());
    }

    #[tokio::test]
    async fn test_user_scope() {
        let repo = seeded().await;
        let granted = vec!["p3".to_string()];

        let response = repo
            .list(
                ListScope::User {
                    user_id: "u1",
                    accessible_ids: &granted,
                },
                &ListQuery::default(),
            )
            .await
            .unwrap();

        assert_eq!(ids(&response), vec!["p1", "p2", "p3"]);
        assert_eq!(response.total, 3);
    }

    #[tokio::test]
    async fn test_admin_scope_ignores_ownership() {
        let repo = seeded().await;

        let response = repo
            .list(ListScope::Admin, &ListQuery::default())
            .await
            .unwrap();

        assert_eq!(response.total, 4);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_counted() {
        let repo = seeded().await;

        let response = repo
            .list(
                ListScope::Admin,
                &ListQuery::default().with_search("alpha").with_limit(1),
            )
            .await
            .unwrap();

        assert_eq!(ids(&response), vec!["p2"]);
        assert_eq!(response.total, 2);
    }

    #[tokio::test]
    async fn test_order_and_paging() {
        let repo = seeded().await;
        let query = ListQuery::default()
            .with_order(Order::new(SortField::Name, SortDirection::Desc))
            .with_offset(1)
            .with_limit(2);

        let response = repo.list(ListScope::Admin, &query).await.unwrap();

        // byte order: lowercase sorts after uppercase
        assert_eq!(ids(&response), vec!["p1", "p4"]);
        assert_eq!(response.total, 4);
    }

    #[tokio::test]
    async fn test_no_order_keeps_insertion_order() {
        let repo = seeded().await;
        let query = ListQuery::from(analytics_core::query::ListParams {
            order: Some("bogusfield:asc".to_string()),
            ..Default::default()
        });

        let response = repo.list(ListScope::Admin, &query).await.unwrap();

        assert_eq!(ids(&response), vec!["p1", "p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_invalid_search() {
        let repo = seeded().await;

        let result = repo
            .list(ListScope::Admin, &ListQuery::default().with_search("("))
            .await;

        assert!(matches!(result, Err(RepositoryError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_pipeline_user_count() {
        let repo = seeded().await;
        repo.insert(&pipeline("p5", "u3", "x")).await.unwrap();
        repo.insert(&pipeline("p6", "u2", "y")).await.unwrap();

        let statistics = repo.pipeline_user_count().await.unwrap();

        assert_eq!(
            statistics,
            vec![
                PipelineUserCount {
                    user_id: "u2".to_string(),
                    count: 3
                },
                PipelineUserCount {
                    user_id: "u1".to_string(),
                    count: 2
                },
                PipelineUserCount {
                    user_id: "u3".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_operator_usage() {
        let repo = InMemoryPipelineRepository::new();
        repo.insert(&with_operators(pipeline("p1", "u1", "a"), &["op-a", "op-b"]))
            .await
            .unwrap();
        repo.insert(&with_operators(pipeline("p2", "u1", "b"), &["op-a", "op-a"]))
            .await
            .unwrap();
        repo.insert(&with_operators(pipeline("p3", "u2", "c"), &["op-c"]))
            .await
            .unwrap();

        let statistics = repo.operator_usage().await.unwrap();

        assert_eq!(
            statistics,
            vec![
                OperatorUsage {
                    operator_id: "op-a".to_string(),
                    count: 2,
                    pipeline_ids: vec!["p1".to_string(), "p2".to_string()],
                },
                OperatorUsage {
                    operator_id: "op-b".to_string(),
                    count: 1,
                    pipeline_ids: vec!["p1".to_string()],
                },
                OperatorUsage {
                    operator_id: "op-c".to_string(),
                    count: 1,
                    pipeline_ids: vec!["p3".to_string()],
                },
            ]
        );
    }
}

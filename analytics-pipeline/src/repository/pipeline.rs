//! Pipeline Repository
//!
//! PostgreSQL storage for pipeline documents.

use analytics_core::domain::pipeline::Pipeline;
use analytics_core::domain::statistics::{OperatorUsage, PipelineUserCount};
use analytics_core::dto::pipeline::PipelinesResponse;
use analytics_core::query::{ListQuery, SortDirection, SortField};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{ListScope, PipelineRepository, RepositoryError, Result, search_regex};

/// Postgres-backed pipeline repository
#[derive(Debug, Clone)]
pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn insert(&self, pipeline: &Pipeline) -> Result<()> {
        let document = serde_json::to_value(pipeline)?;

        sqlx::query(
            r#"
            INSERT INTO pipelines (id, user_id, name, created_at, updated_at, document)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&pipeline.id)
        .bind(&pipeline.user_id)
        .bind(&pipeline.name)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return RepositoryError::Duplicate(pipeline.id.clone());
                }
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    async fn replace(&self, pipeline: &Pipeline) -> Result<()> {
        let document = serde_json::to_value(pipeline)?;

        sqlx::query(
            r#"
            UPDATE pipelines
            SET user_id = $2, name = $3, created_at = $4, updated_at = $5, document = $6
            WHERE id = $1
            "#,
        )
        .bind(&pipeline.id)
        .bind(&pipeline.user_id)
        .bind(&pipeline.name)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Pipeline> {
        let row = sqlx::query_as::<_, PipelineRow>("SELECT document FROM pipelines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Pipeline::from)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list(&self, scope: ListScope<'_>, query: &ListQuery) -> Result<PipelinesResponse> {
        search_regex(query)?;

        let total: i64 = count_query(scope, query)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(list_error)?;

        let rows = select_query(scope, query)
            .build_query_as::<PipelineRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(list_error)?;

        Ok(PipelinesResponse {
            data: rows.into_iter().map(Pipeline::from).collect(),
            total,
        })
    }

    async fn pipeline_user_count(&self) -> Result<Vec<PipelineUserCount>> {
        let rows = sqlx::query_as::<_, UserCountRow>(
            r#"
            SELECT user_id, COUNT(*) AS count
            FROM pipelines
            GROUP BY user_id
            ORDER BY count DESC, user_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn operator_usage(&self) -> Result<Vec<OperatorUsage>> {
        let rows = sqlx::query_as::<_, OperatorUsageRow>(
            r#"
            SELECT COALESCE(op->>'id', '') AS operator_id,
                   COUNT(DISTINCT p.id) AS count,
                   ARRAY_AGG(DISTINCT p.id ORDER BY p.id) AS pipeline_ids
            FROM pipelines p
            CROSS JOIN LATERAL jsonb_array_elements(p.document->'operators') AS op
            WHERE jsonb_typeof(p.document->'operators') = 'array'
            GROUP BY COALESCE(op->>'id', '')
            ORDER BY count DESC, operator_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Query Building
// =============================================================================

fn count_query(scope: ListScope<'_>, query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM pipelines");
    push_predicate(&mut builder, scope, query);
    builder
}

fn select_query(scope: ListScope<'_>, query: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT document FROM pipelines");
    push_predicate(&mut builder, scope, query);

    if let Some(order) = query.order {
        builder
            .push(" ORDER BY ")
            .push(sort_column(order.field))
            .push(match order.direction {
                SortDirection::Asc => " ASC",
                SortDirection::Desc => " DESC",
            });
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(to_i64(limit));
    }
    if let Some(offset) = query.offset {
        builder.push(" OFFSET ").push_bind(to_i64(offset));
    }

    builder
}

/// Ownership (or admin) predicate AND the optional name filter
fn push_predicate(
    builder: &mut QueryBuilder<'static, Postgres>,
    scope: ListScope<'_>,
    query: &ListQuery,
) {
    builder.push(" WHERE TRUE");

    if let ListScope::User {
        user_id,
        accessible_ids,
    } = scope
    {
        builder
            .push(" AND (user_id = ")
            .push_bind(user_id.to_string())
            .push(" OR id = ANY(")
            .push_bind(accessible_ids.to_vec())
            .push("))");
    }

    if let Some(search) = &query.search {
        builder.push(" AND name ~* ").push_bind(search.clone());
    }
}

/// Text columns sort by byte order, matching the in-memory store
fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Name => "name COLLATE \"C\"",
        SortField::Id => "id COLLATE \"C\"",
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
    }
}

/// SQLSTATE raised when `~*` receives a pattern PostgreSQL cannot compile
const INVALID_REGULAR_EXPRESSION: &str = "2201B";

/// Patterns the regex crate accepts can still be rejected by PostgreSQL
fn list_error(err: sqlx::Error) -> RepositoryError {
    let rejected_pattern = match &err {
        sqlx::Error::Database(db) if is_invalid_pattern(db.code().as_deref()) => {
            Some(db.message().to_string())
        }
        _ => None,
    };

    match rejected_pattern {
        Some(message) => RepositoryError::InvalidQuery(format!("invalid search pattern: {}", message)),
        None => RepositoryError::Database(err),
    }
}

fn is_invalid_pattern(code: Option<&str>) -> bool {
    code == Some(INVALID_REGULAR_EXPRESSION)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    document: Json<Pipeline>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        row.document.0
    }
}

#[derive(sqlx::FromRow)]
struct UserCountRow {
    user_id: String,
    count: i64,
}

impl From<UserCountRow> for PipelineUserCount {
    fn from(row: UserCountRow) -> Self {
        PipelineUserCount {
            user_id: row.user_id,
            count: row.count,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OperatorUsageRow {
    operator_id: String,
    count: i64,
    pipeline_ids: Vec<String>,
}

impl From<OperatorUsageRow> for OperatorUsage {
    fn from(row: OperatorUsageRow) -> Self {
        OperatorUsage {
            operator_id: row.operator_id,
            count: row.count,
            pipeline_ids: row.pipeline_ids,
        }
    }
}

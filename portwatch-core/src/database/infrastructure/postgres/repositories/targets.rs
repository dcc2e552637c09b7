use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portwatch_model::{Target, TargetId, TargetSource};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::database::ports::targets::TargetRepository;
use crate::error::{Result, ScanError};
use crate::target::NewTarget;

const TARGET_COLUMNS: &str =
    "id, address, description, enabled, source, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PostgresTargetRepository {
    pool: PgPool,
}

impl PostgresTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TargetRepository for PostgresTargetRepository {
    async fn list_targets(&self) -> Result<Vec<Target>> {
        self.fetch_where("TRUE ORDER BY created_at DESC").await
    }

    async fn list_enabled_targets(&self) -> Result<Vec<Target>> {
        self.fetch_where("enabled ORDER BY created_at").await
    }

    async fn list_managed_targets(&self) -> Result<Vec<Target>> {
        self.fetch_where("source = 'inventory' ORDER BY created_at")
            .await
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            "SELECT {TARGET_COLUMNS} FROM scan_targets WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(store_error("Failed to load target"))?;

        row.map(Target::try_from).transpose()
    }

    async fn insert_target(&self, target: &NewTarget) -> Result<Target> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            r#"
            INSERT INTO scan_targets (id, address, description, enabled, source)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(TargetId::new().to_uuid())
        .bind(target.address())
        .bind(target.description())
        .bind(target.source().as_str())
        .fetch_one(self.pool())
        .await
        .map_err(store_error("Failed to insert target"))?;

        row.try_into()
    }

    async fn update_description(
        &self,
        id: TargetId,
        description: &str,
    ) -> Result<Target> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            r#"
            UPDATE scan_targets
            SET description = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(description)
        .fetch_one(self.pool())
        .await
        .map_err(store_error("target"))?;

        row.try_into()
    }

    async fn toggle_target(&self, id: TargetId) -> Result<Target> {
        let row = sqlx::query_as::<_, TargetRow>(&format!(
            r#"
            UPDATE scan_targets
            SET enabled = NOT enabled, updated_at = NOW()
            WHERE id = $1
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(store_error("target"))?;

        row.try_into()
    }

    async fn delete_target(&self, id: TargetId) -> Result<()> {
        let result = sqlx::query("DELETE FROM scan_targets WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(store_error("Failed to delete target"))?;

        if result.rows_affected() == 0 {
            return Err(ScanError::NotFound(format!("target {id}")));
        }
        Ok(())
    }
}

impl PostgresTargetRepository {
    async fn fetch_where(&self, clause: &str) -> Result<Vec<Target>> {
        let rows = sqlx::query_as::<_, TargetRow>(&format!(
            "SELECT {TARGET_COLUMNS} FROM scan_targets WHERE {clause}"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(store_error("Failed to list targets"))?;

        rows.into_iter().map(Target::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    address: String,
    description: String,
    enabled: bool,
    source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TargetRow> for Target {
    type Error = ScanError;

    fn try_from(row: TargetRow) -> Result<Self> {
        Ok(Target {
            id: TargetId(row.id),
            address: row.address,
            description: row.description,
            enabled: row.enabled,
            source: row.source.parse::<TargetSource>()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portwatch_model::{ScanSession, SessionId, SessionStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::database::ports::sessions::SessionRepository;
use crate::error::{Result, ScanError};

const SESSION_COLUMNS: &str =
    "id, started_at, completed_at, addresses_scanned, ports_scanned, status";

#[derive(Clone, Debug)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn create_session(&self) -> Result<ScanSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO scan_sessions (id, started_at, status)
            VALUES ($1, NOW(), 'running')
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(SessionId::new().to_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(store_error("Failed to create scan session"))?;

        row.try_into()
    }

    async fn complete_session(
        &self,
        id: SessionId,
        addresses_scanned: u64,
        ports_scanned: u64,
    ) -> Result<ScanSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE scan_sessions
            SET completed_at = NOW(),
                addresses_scanned = $2,
                ports_scanned = $3,
                status = 'completed'
            WHERE id = $1 AND status = 'running'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(clamp_count(addresses_scanned))
        .bind(clamp_count(ports_scanned))
        .fetch_one(self.pool())
        .await
        .map_err(store_error("running session"))?;

        row.try_into()
    }

    async fn fail_session(&self, id: SessionId) -> Result<ScanSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE scan_sessions
            SET completed_at = NOW(), status = 'failed'
            WHERE id = $1 AND status = 'running'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .fetch_one(self.pool())
        .await
        .map_err(store_error("running session"))?;

        row.try_into()
    }

    async fn recent_sessions(&self, limit: u32) -> Result<Vec<ScanSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM scan_sessions ORDER BY started_at DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(store_error("Failed to list scan sessions"))?;

        rows.into_iter().map(ScanSession::try_from).collect()
    }
}

fn clamp_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    addresses_scanned: i64,
    ports_scanned: i64,
    status: String,
}

impl TryFrom<SessionRow> for ScanSession {
    type Error = ScanError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(ScanSession {
            id: SessionId(row.id),
            started_at: row.started_at,
            completed_at: row.completed_at,
            addresses_scanned: row.addresses_scanned.max(0) as u64,
            ports_scanned: row.ports_scanned.max(0) as u64,
            status: row.status.parse::<SessionStatus>()?,
        })
    }
}

use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portwatch_model::{
    LatestResult, NewScanResult, PortStatus, ResultId, ScanResult, TargetId,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{address_from_db, port_from_db, store_error};
use crate::database::ports::results::ScanResultRepository;
use crate::error::{Result, ScanError};

// Ties on scanned_at fall back to the v7 id, i.e. insertion order.
const LATEST_PER_PAIR: &str = r#"
    SELECT DISTINCT ON (r.ip_address, r.port)
        r.id, r.target_id, r.ip_address, r.port, r.status,
        r.response_time_ms, r.scanned_at,
        (
            SELECT MIN(o.scanned_at)
            FROM scan_results o
            WHERE o.ip_address = r.ip_address
              AND o.port = r.port
              AND o.status = 'open'
        ) AS first_seen_open_at
    FROM scan_results r
    ORDER BY r.ip_address, r.port, r.scanned_at DESC, r.id DESC
"#;

#[derive(Clone, Debug)]
pub struct PostgresScanResultRepository {
    pool: PgPool,
}

impl PostgresScanResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScanResultRepository for PostgresScanResultRepository {
    async fn insert_result(&self, result: &NewScanResult) -> Result<ScanResult> {
        let row = sqlx::query_as::<_, ResultRow>(
            r#"
            INSERT INTO scan_results (
                id, target_id, ip_address, port, status, response_time_ms, scanned_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE EXISTS (SELECT 1 FROM scan_targets WHERE id = $2)
            RETURNING id, target_id, ip_address, port, status, response_time_ms, scanned_at
            "#,
        )
        .bind(ResultId::new().to_uuid())
        .bind(result.target_id.as_uuid())
        .bind(result.address.to_string())
        .bind(i32::from(result.port))
        .bind(result.status.as_str())
        .bind(result.response_time_ms.map(|ms| ms.min(i32::MAX as u32) as i32))
        .bind(result.scanned_at)
        .fetch_optional(self.pool())
        .await
        .map_err(store_error("Failed to insert scan result"))?
        .ok_or_else(|| {
            ScanError::NotFound(format!("target {} for scan result", result.target_id))
        })?;

        row.try_into()
    }

    async fn latest_status(
        &self,
        target_id: TargetId,
        address: IpAddr,
        port: u16,
    ) -> Result<Option<PortStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            SELECT status
            FROM scan_results
            WHERE target_id = $1 AND ip_address = $2 AND port = $3
            ORDER BY scanned_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(target_id.as_uuid())
        .bind(address.to_string())
        .bind(i32::from(port))
        .fetch_optional(self.pool())
        .await
        .map_err(store_error("Failed to look up previous status"))?;

        Ok(status.map(|s| s.parse::<PortStatus>()).transpose()?)
    }

    async fn latest_results(&self) -> Result<Vec<LatestResult>> {
        self.fetch_latest(LATEST_PER_PAIR.to_string()).await
    }

    async fn open_ports(&self) -> Result<Vec<LatestResult>> {
        self.fetch_latest(format!(
            "SELECT * FROM ({LATEST_PER_PAIR}) latest WHERE latest.status = 'open'"
        ))
        .await
    }

    async fn results_for_address(&self, address: IpAddr) -> Result<Vec<ScanResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT id, target_id, ip_address, port, status, response_time_ms, scanned_at
            FROM scan_results
            WHERE ip_address = $1
            ORDER BY scanned_at DESC, port
            LIMIT 100
            "#,
        )
        .bind(address.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(store_error("Failed to load results for address"))?;

        rows.into_iter().map(ScanResult::try_from).collect()
    }
}

impl PostgresScanResultRepository {
    async fn fetch_latest(&self, sql: String) -> Result<Vec<LatestResult>> {
        let rows = sqlx::query_as::<_, LatestRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(store_error("Failed to load latest results"))?;

        let mut latest = rows
            .into_iter()
            .map(LatestResult::try_from)
            .collect::<Result<Vec<_>>>()?;
        // TEXT ordering is lexical; present addresses numerically.
        latest.sort_by_key(|r| (r.result.address, r.result.port));
        Ok(latest)
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: Uuid,
    target_id: Uuid,
    ip_address: String,
    port: i32,
    status: String,
    response_time_ms: Option<i32>,
    scanned_at: DateTime<Utc>,
}

impl TryFrom<ResultRow> for ScanResult {
    type Error = ScanError;

    fn try_from(row: ResultRow) -> Result<Self> {
        Ok(ScanResult {
            id: ResultId(row.id),
            target_id: TargetId(row.target_id),
            address: address_from_db(&row.ip_address)?,
            port: port_from_db(row.port)?,
            status: row.status.parse()?,
            response_time_ms: row.response_time_ms.map(|ms| ms.max(0) as u32),
            scanned_at: row.scanned_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LatestRow {
    #[sqlx(flatten)]
    result: ResultRow,
    first_seen_open_at: Option<DateTime<Utc>>,
}

impl TryFrom<LatestRow> for LatestResult {
    type Error = ScanError;

    fn try_from(row: LatestRow) -> Result<Self> {
        Ok(LatestResult {
            result: row.result.try_into()?,
            first_seen_open_at: row.first_seen_open_at,
        })
    }
}

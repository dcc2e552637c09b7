use std::net::IpAddr;

use async_trait::async_trait;
use portwatch_model::{LatestResult, NewScanResult, PortStatus, ScanResult, TargetId};

use crate::error::Result;

/// Append-only store of probe observations.
#[async_trait]
pub trait ScanResultRepository: Send + Sync {
    async fn insert_result(&self, result: &NewScanResult) -> Result<ScanResult>;

    /// Status of the most recent row for the (target, address, port) triple.
    async fn latest_status(
        &self,
        target_id: TargetId,
        address: IpAddr,
        port: u16,
    ) -> Result<Option<PortStatus>>;

    /// Most recent row per (address, port), ordered by address then port.
    async fn latest_results(&self) -> Result<Vec<LatestResult>>;

    /// Subset of [`latest_results`](Self::latest_results) currently open.
    async fn open_ports(&self) -> Result<Vec<LatestResult>>;

    /// Newest first, capped at 100 rows.
    async fn results_for_address(&self, address: IpAddr) -> Result<Vec<ScanResult>>;
}

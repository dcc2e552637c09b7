use async_trait::async_trait;
use portwatch_model::{ScanSession, SessionId};

use crate::error::Result;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session in the `running` state.
    async fn create_session(&self) -> Result<ScanSession>;

    /// Finalize a running session with its totals. Finalized sessions are
    /// immutable; finalizing twice yields `NotFound`.
    async fn complete_session(
        &self,
        id: SessionId,
        addresses_scanned: u64,
        ports_scanned: u64,
    ) -> Result<ScanSession>;

    async fn fail_session(&self, id: SessionId) -> Result<ScanSession>;

    /// Newest first.
    async fn recent_sessions(&self, limit: u32) -> Result<Vec<ScanSession>>;
}

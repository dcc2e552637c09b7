//! Live cloud address inventories and the reconciler that mirrors them into
//! auto-imported scan targets.

pub mod file;
pub mod multi;
pub mod reconciler;

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileInventory;
pub use multi::MultiAccountInventory;
pub use reconciler::{InventoryReconciler, ReconcileReport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// No credentials or export configured; reconciliation is skipped.
    #[error("no inventory source configured")]
    NotConfigured,

    #[error("inventory source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed inventory data: {0}")]
    Malformed(String),
}

/// Something that can list the public addresses currently live in a cloud
/// account.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn public_addresses(&self) -> Result<Vec<IpAddr>, InventoryError>;
}

use thiserror::Error;

use crate::inventory::InventoryError;

#[derive(Error, Debug)]
pub enum ScanError {
    /// The address-or-CIDR string does not parse. Raised when a target is
    /// registered, never while scanning.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ScanError::NotFound("row not found".to_string()),
            other => ScanError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<portwatch_model::ModelError> for ScanError {
    fn from(err: portwatch_model::ModelError) -> Self {
        ScanError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

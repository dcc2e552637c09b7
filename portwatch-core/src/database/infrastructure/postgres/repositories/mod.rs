//! PostgreSQL-backed repository implementations.

pub mod notifications;
pub mod results;
pub mod sessions;
pub mod targets;

use crate::error::ScanError;

/// Wrap a driver error with the operation that produced it.
pub(crate) fn store_error(context: &str) -> impl FnOnce(sqlx::Error) -> ScanError + '_ {
    move |err| match err {
        sqlx::Error::RowNotFound => ScanError::NotFound(context.to_string()),
        other => ScanError::StoreUnavailable(format!("{context}: {other}")),
    }
}

/// Columns holding a port are INTEGER; anything outside u16 means the row
/// was written by something other than this crate.
pub(crate) fn port_from_db(value: i32) -> Result<u16, ScanError> {
    u16::try_from(value).map_err(|_| ScanError::Internal(format!("port out of range in store: {value}")))
}

pub(crate) fn address_from_db(value: &str) -> Result<std::net::IpAddr, ScanError> {
    value
        .parse()
        .map_err(|_| ScanError::Internal(format!("malformed address in store: {value}")))
}

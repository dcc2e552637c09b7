//! Core data model definitions shared across portwatch crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod error;
pub mod ids;
pub mod notification;
pub mod scan;
pub mod target;

pub use error::{ModelError, Result as ModelResult};
pub use ids::{NotificationId, ResultId, SessionId, TargetId};
pub use notification::{NewNotification, Notification, NotificationKind, Severity};
pub use scan::{
    LatestResult, NewScanResult, PortStatus, ScanResult, ScanSession,
    SessionStatus,
};
pub use target::{Target, TargetSource};

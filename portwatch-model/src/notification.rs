use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::chrono::{DateTime, Utc};
use crate::error::ModelError;
use crate::ids::{NotificationId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NotificationKind {
    /// A port moved from closed to open.
    NewPort,
    /// A port moved from open to closed and stayed closed on re-probe.
    PortClosed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewPort => "new_port",
            NotificationKind::PortClosed => "port_closed",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            NotificationKind::NewPort => Severity::Warning,
            NotificationKind::PortClosed => Severity::Info,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_port" => Ok(NotificationKind::NewPort),
            "port_closed" => Ok(NotificationKind::PortClosed),
            other => Err(ModelError::UnknownVariant {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            other => Err(ModelError::UnknownVariant {
                kind: "severity",
                value: other.to_string(),
            }),
        }
    }
}

/// Notification about to be written by the change detector or verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    pub target_id: Option<TargetId>,
}

impl NewNotification {
    /// Port transition notification with the standard title and wording.
    pub fn port_transition(
        kind: NotificationKind,
        target_id: TargetId,
        address: IpAddr,
        port: u16,
    ) -> Self {
        let (title, message) = match kind {
            NotificationKind::NewPort => (
                "New Open Port Detected",
                format!("Port {port} is now open on {address}"),
            ),
            NotificationKind::PortClosed => (
                "Port Closed",
                format!("Port {port} is now closed on {address} (verified)"),
            ),
        };

        Self {
            kind,
            title: title.to_string(),
            message,
            severity: kind.severity(),
            address: Some(address),
            port: Some(port),
            target_id: Some(target_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
    pub target_id: Option<TargetId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn new_port_notifications_are_warnings() {
        let n = NewNotification::port_transition(
            NotificationKind::NewPort,
            TargetId::new(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            22,
        );
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.title, "New Open Port Detected");
        assert_eq!(n.message, "Port 22 is now open on 10.0.0.7");
    }

    #[test]
    fn closed_notifications_mention_verification() {
        let n = NewNotification::port_transition(
            NotificationKind::PortClosed,
            TargetId::new(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
            443,
        );
        assert_eq!(n.severity, Severity::Info);
        assert_eq!(n.message, "Port 443 is now closed on 10.0.0.7 (verified)");
    }
}

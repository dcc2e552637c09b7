use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::chrono::{DateTime, Utc};
use crate::error::ModelError;
use crate::ids::{ResultId, SessionId, TargetId};

/// Classification of a single TCP connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PortStatus {
    Open,
    Closed,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PortStatus::Open)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PortStatus::Open),
            "closed" => Ok(PortStatus::Closed),
            other => Err(ModelError::UnknownVariant {
                kind: "port status",
                value: other.to_string(),
            }),
        }
    }
}

/// Observation handed to the store. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NewScanResult {
    pub target_id: TargetId,
    pub address: IpAddr,
    pub port: u16,
    pub status: PortStatus,
    /// Connect latency in whole milliseconds; only set for open ports.
    pub response_time_ms: Option<u32>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanResult {
    pub id: ResultId,
    pub target_id: TargetId,
    pub address: IpAddr,
    pub port: u16,
    pub status: PortStatus,
    pub response_time_ms: Option<u32>,
    pub scanned_at: DateTime<Utc>,
}

/// Current state of one (address, port) pair: its most recent row, plus the
/// first time the pair was ever observed open.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatestResult {
    pub result: ScanResult,
    pub first_seen_open_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(ModelError::UnknownVariant {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

/// Bookkeeping for one orchestrator run.
///
/// Created as `Running` when the cycle begins and finalized exactly once,
/// either `Completed` with totals or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanSession {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of addresses whose port list was fully probed.
    pub addresses_scanned: u64,
    /// Number of port checks whose result was persisted.
    pub ports_scanned: u64,
    pub status: SessionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for status in [PortStatus::Open, PortStatus::Closed] {
            assert_eq!(status.as_str().parse::<PortStatus>(), Ok(status));
        }
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "filtered".parse::<PortStatus>().unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownVariant {
                kind: "port status",
                value: "filtered".into()
            }
        );
    }

    #[test]
    fn only_running_sessions_are_unfinished() {
        assert!(!SessionStatus::Running.is_finished());
        assert!(SessionStatus::Completed.is_finished());
        assert!(SessionStatus::Failed.is_finished());
    }
}

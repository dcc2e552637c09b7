use std::fmt;
use std::str::FromStr;

use crate::chrono::{DateTime, Utc};
use crate::error::ModelError;
use crate::ids::TargetId;

/// How a target entered the store.
///
/// Inventory targets are owned by the reconciler: it creates them and it is
/// the only component allowed to delete them when the cloud account no longer
/// reports the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TargetSource {
    #[default]
    Manual,
    Inventory,
}

impl TargetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSource::Manual => "manual",
            TargetSource::Inventory => "inventory",
        }
    }
}

impl fmt::Display for TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetSource {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TargetSource::Manual),
            "inventory" => Ok(TargetSource::Inventory),
            other => Err(ModelError::UnknownVariant {
                kind: "target source",
                value: other.to_string(),
            }),
        }
    }
}

/// A single address or CIDR block that the scheduler probes every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Target {
    pub id: TargetId,
    /// Address-or-CIDR string exactly as registered.
    pub address: String,
    pub description: String,
    pub enabled: bool,
    pub source: TargetSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    pub fn is_managed(&self) -> bool {
        self.source == TargetSource::Inventory
    }
}

pub mod resolver;

use std::net::IpAddr;

use portwatch_model::TargetSource;

use crate::error::Result;

pub use resolver::{TargetAddresses, is_valid, resolve};

/// A target registration that has passed grammar validation.
///
/// Every insert into a [`TargetRepository`](crate::database::ports::targets::TargetRepository)
/// takes one of these, so malformed strings are rejected at creation time
/// and never reach the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTarget {
    address: String,
    description: String,
    source: TargetSource,
}

impl NewTarget {
    /// Operator-registered single address or CIDR block.
    pub fn manual(address: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        let address = address.into();
        resolve(&address)?;
        Ok(Self {
            address,
            description: description.into(),
            source: TargetSource::Manual,
        })
    }

    /// Address discovered in a cloud inventory.
    pub fn inventory(address: IpAddr, description: impl Into<String>) -> Self {
        Self {
            address: address.to_string(),
            description: description.into(),
            source: TargetSource::Inventory,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> TargetSource {
        self.source
    }
}

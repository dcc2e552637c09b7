use std::{collections::BTreeSet, fmt, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{InventoryError, InventorySource};

/// Union of several cloud accounts.
///
/// An account that fails is logged and skipped; the call only fails when no
/// account answered.
#[derive(Default, Clone)]
pub struct MultiAccountInventory {
    accounts: Vec<(String, Arc<dyn InventorySource>)>,
}

impl fmt::Debug for MultiAccountInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiAccountInventory")
            .field(
                "accounts",
                &self.accounts.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl MultiAccountInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn InventorySource>,
    ) -> Self {
        self.accounts.push((name.into(), source));
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl InventorySource for MultiAccountInventory {
    async fn public_addresses(&self) -> Result<Vec<IpAddr>, InventoryError> {
        if self.accounts.is_empty() {
            return Err(InventoryError::NotConfigured);
        }

        let mut addresses = BTreeSet::new();
        let mut answered = 0usize;
        let mut errors = Vec::new();

        for (name, source) in &self.accounts {
            match source.public_addresses().await {
                Ok(found) => {
                    debug!(target: "inventory::sync", account = %name, count = found.len(), "account listed");
                    answered += 1;
                    addresses.extend(found);
                }
                Err(err) => {
                    warn!(target: "inventory::sync", account = %name, error = %err, "skipping inventory account");
                    errors.push(err);
                }
            }
        }

        if answered == 0 {
            if errors.iter().all(|err| *err == InventoryError::NotConfigured) {
                return Err(InventoryError::NotConfigured);
            }
            return Err(InventoryError::Unavailable(format!(
                "all {} inventory accounts failed",
                errors.len()
            )));
        }

        Ok(addresses.into_iter().collect())
    }
}

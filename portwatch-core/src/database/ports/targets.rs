use async_trait::async_trait;
use portwatch_model::{Target, TargetId};

use crate::{error::Result, target::NewTarget};

#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<Target>>;
    async fn list_enabled_targets(&self) -> Result<Vec<Target>>;
    /// Targets created by the inventory reconciler.
    async fn list_managed_targets(&self) -> Result<Vec<Target>>;
    async fn get_target(&self, id: TargetId) -> Result<Option<Target>>;
    async fn insert_target(&self, target: &NewTarget) -> Result<Target>;
    async fn update_description(&self, id: TargetId, description: &str) -> Result<Target>;
    /// Flip the enabled flag and return the updated row.
    async fn toggle_target(&self, id: TargetId) -> Result<Target>;
    async fn delete_target(&self, id: TargetId) -> Result<()>;
}

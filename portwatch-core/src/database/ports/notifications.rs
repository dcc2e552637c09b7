use async_trait::async_trait;
use portwatch_model::{NewNotification, Notification, NotificationId};

use crate::error::Result;

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &NewNotification) -> Result<Notification>;

    /// Newest first, capped at 100 rows.
    async fn list_notifications(&self, unread_only: bool) -> Result<Vec<Notification>>;
    async fn unread_count(&self) -> Result<u64>;
    async fn mark_read(&self, id: NotificationId) -> Result<()>;
    async fn mark_all_read(&self) -> Result<u64>;
    async fn delete_notification(&self, id: NotificationId) -> Result<()>;
    /// Remove every notification already marked read.
    async fn delete_read(&self) -> Result<u64>;
}

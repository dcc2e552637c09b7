use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portwatch_model::{
    NewNotification, Notification, NotificationId, TargetId,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{address_from_db, port_from_db, store_error};
use crate::database::ports::notifications::NotificationRepository;
use crate::error::{Result, ScanError};

const NOTIFICATION_COLUMNS: &str = "id, type, title, message, severity, \
     ip_address, port, target_id, is_read, created_at";

#[derive(Clone, Debug)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notifications (
                id, type, title, message, severity, ip_address, port, target_id
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                (SELECT id FROM scan_targets WHERE id = $8)
            )
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(NotificationId::new().to_uuid())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(notification.address.map(|addr| addr.to_string()))
        .bind(notification.port.map(i32::from))
        .bind(notification.target_id.map(|id| id.to_uuid()))
        .fetch_one(self.pool())
        .await
        .map_err(store_error("Failed to insert notification"))?;

        row.try_into()
    }

    async fn list_notifications(
        &self,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE NOT $1 OR NOT is_read
            ORDER BY created_at DESC
            LIMIT 100
            "#
        ))
        .bind(unread_only)
        .fetch_all(self.pool())
        .await
        .map_err(store_error("Failed to list notifications"))?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn unread_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE NOT is_read",
        )
        .fetch_one(self.pool())
        .await
        .map_err(store_error("Failed to count unread notifications"))?;

        Ok(count.max(0) as u64)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<()> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
                .bind(id.as_uuid())
                .execute(self.pool())
                .await
                .map_err(store_error("Failed to mark notification read"))?;

        if result.rows_affected() == 0 {
            return Err(ScanError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE NOT is_read",
        )
        .execute(self.pool())
        .await
        .map_err(store_error("Failed to mark notifications read"))?;

        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: NotificationId) -> Result<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(store_error("Failed to delete notification"))?;

        if result.rows_affected() == 0 {
            return Err(ScanError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn delete_read(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE is_read")
            .execute(self.pool())
            .await
            .map_err(store_error("Failed to delete read notifications"))?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    severity: String,
    ip_address: Option<String>,
    port: Option<i32>,
    target_id: Option<Uuid>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = ScanError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: NotificationId(row.id),
            kind: row.kind.parse()?,
            title: row.title,
            message: row.message,
            severity: row.severity.parse()?,
            address: row.ip_address.as_deref().map(address_from_db).transpose()?,
            port: row.port.map(port_from_db).transpose()?,
            target_id: row.target_id.map(TargetId),
            read: row.is_read,
            created_at: row.created_at,
        })
    }
}

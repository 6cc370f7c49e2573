//! Repository for the `notification_recipients` table.

use sqlx::PgPool;

use crate::models::notification::NotificationRecipient;

const COLUMNS: &str = "id, resource_id, channel, email, is_primary, created_at";

pub struct RecipientRepo;

impl RecipientRepo {
    /// Recipients for a resource channel, primary first.
    pub async fn list_for_channel(
        pool: &PgPool,
        resource_id: &str,
        channel: &str,
    ) -> Result<Vec<NotificationRecipient>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_recipients \
             WHERE resource_id = $1 AND channel = $2 \
             ORDER BY is_primary DESC, id ASC"
        );
        sqlx::query_as::<_, NotificationRecipient>(&query)
            .bind(resource_id)
            .bind(channel)
            .fetch_all(pool)
            .await
    }

    /// Add or update a recipient.
    pub async fn upsert(
        pool: &PgPool,
        resource_id: &str,
        channel: &str,
        email: &str,
        is_primary: bool,
    ) -> Result<NotificationRecipient, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_recipients (resource_id, channel, email, is_primary) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT ON CONSTRAINT uq_notification_recipients_email \
             DO UPDATE SET is_primary = EXCLUDED.is_primary \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationRecipient>(&query)
            .bind(resource_id)
            .bind(channel)
            .bind(email)
            .bind(is_primary)
            .fetch_one(pool)
            .await
    }
}

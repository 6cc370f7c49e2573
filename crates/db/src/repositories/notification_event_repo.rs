//! Repository for the `notification_events` table.

use parcel_core::notification::{Correlation, NotificationEvent};
use parcel_core::types::Timestamp;
use sqlx::PgPool;

use crate::models::notification::NotificationEventRow;

/// Column list for `notification_events` queries.
const COLUMNS: &str =
    "id, team_id, resource_id, channel, actor, event_type, subject_id, payload, occurred_at";

/// Provides append and read-back for debounced notification events.
pub struct NotificationEventRepo;

impl NotificationEventRepo {
    /// Append a qualifying event.
    pub async fn insert(pool: &PgPool, event: &NotificationEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notification_events \
                (id, team_id, resource_id, channel, actor, event_type, subject_id, payload, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id)
        .bind(&event.team_id)
        .bind(&event.correlation.resource_id)
        .bind(&event.correlation.channel)
        .bind(&event.correlation.actor)
        .bind(&event.event_type)
        .bind(&event.subject_id)
        .bind(&event.payload)
        .bind(event.occurred_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Events for `correlation` that occurred at or after `since`, oldest first.
    pub async fn list_since(
        pool: &PgPool,
        correlation: &Correlation,
        since: Timestamp,
    ) -> Result<Vec<NotificationEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_events \
             WHERE resource_id = $1 AND channel = $2 AND actor = $3 AND occurred_at >= $4 \
             ORDER BY occurred_at ASC"
        );
        let rows = sqlx::query_as::<_, NotificationEventRow>(&query)
            .bind(&correlation.resource_id)
            .bind(&correlation.channel)
            .bind(&correlation.actor)
            .bind(since)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(NotificationEvent::from).collect())
    }

    /// Delete events older than `before`. Returns the number removed.
    pub async fn delete_older_than(pool: &PgPool, before: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_events WHERE occurred_at < $1")
            .bind(before)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Notification event and recipient rows.

use parcel_core::notification::{Correlation, NotificationEvent};
use parcel_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notification_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationEventRow {
    pub id: uuid::Uuid,
    pub team_id: String,
    pub resource_id: String,
    pub channel: String,
    pub actor: String,
    pub event_type: String,
    pub subject_id: String,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
}

impl From<NotificationEventRow> for NotificationEvent {
    fn from(row: NotificationEventRow) -> Self {
        NotificationEvent {
            id: row.id,
            team_id: row.team_id,
            correlation: Correlation::new(row.resource_id, row.channel, row.actor),
            event_type: row.event_type,
            subject_id: row.subject_id,
            payload: row.payload,
            occurred_at: row.occurred_at,
        }
    }
}

/// A row from the `notification_recipients` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationRecipient {
    pub id: i64,
    pub resource_id: String,
    pub channel: String,
    pub email: String,
    pub is_primary: bool,
    pub created_at: Timestamp,
}

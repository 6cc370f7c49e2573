//! Who receives a batched notification.

use async_trait::async_trait;
use parcel_db::models::notification::NotificationRecipient;
use parcel_db::repositories::RecipientRepo;
use parcel_db::DbPool;
use serde::Serialize;

use crate::error::DebounceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    pub is_primary: bool,
}

impl From<NotificationRecipient> for Recipient {
    fn from(row: NotificationRecipient) -> Self {
        Self {
            email: row.email,
            is_primary: row.is_primary,
        }
    }
}

#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn resolve(&self, resource_id: &str, channel: &str)
        -> Result<Vec<Recipient>, DebounceError>;
}

/// Reads the `notification_recipients` table.
pub struct PgRecipientResolver {
    pool: DbPool,
}

impl PgRecipientResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientResolver for PgRecipientResolver {
    async fn resolve(
        &self,
        resource_id: &str,
        channel: &str,
    ) -> Result<Vec<Recipient>, DebounceError> {
        let rows = RecipientRepo::list_for_channel(&self.pool, resource_id, channel).await?;
        Ok(rows.into_iter().map(Recipient::from).collect())
    }
}

/// Fixed recipient list, regardless of resource or channel.
#[derive(Debug, Clone, Default)]
pub struct StaticRecipients(pub Vec<Recipient>);

#[async_trait]
impl RecipientResolver for StaticRecipients {
    async fn resolve(&self, _resource_id: &str, _channel: &str) -> Result<Vec<Recipient>, DebounceError> {
        Ok(self.0.clone())
    }
}

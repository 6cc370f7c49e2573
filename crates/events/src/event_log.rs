//! Durable log of debounced notification events.

use async_trait::async_trait;
use parcel_core::notification::{Correlation, NotificationEvent};
use parcel_core::types::Timestamp;
use parcel_db::repositories::NotificationEventRepo;
use parcel_db::DbPool;
use tokio::sync::RwLock;

use crate::error::DebounceError;

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Persist an event. Re-appending the same event id is a no-op.
    async fn append(&self, event: &NotificationEvent) -> Result<(), DebounceError>;

    /// Events for `correlation` that occurred at or after `since`, oldest first.
    async fn list_since(
        &self,
        correlation: &Correlation,
        since: Timestamp,
    ) -> Result<Vec<NotificationEvent>, DebounceError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgEventLog {
    pool: DbPool,
}

impl PgEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, event: &NotificationEvent) -> Result<(), DebounceError> {
        NotificationEventRepo::insert(&self.pool, event).await?;
        Ok(())
    }

    async fn list_since(
        &self,
        correlation: &Correlation,
        since: Timestamp,
    ) -> Result<Vec<NotificationEvent>, DebounceError> {
        Ok(NotificationEventRepo::list_since(&self.pool, correlation, since).await?)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<NotificationEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: &NotificationEvent) -> Result<(), DebounceError> {
        let mut events = self.events.write().await;
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event.clone());
        }
        Ok(())
    }

    async fn list_since(
        &self,
        correlation: &Correlation,
        since: Timestamp,
    ) -> Result<Vec<NotificationEvent>, DebounceError> {
        let mut matching: Vec<NotificationEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| &e.correlation == correlation && e.occurred_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.occurred_at);
        Ok(matching)
    }
}

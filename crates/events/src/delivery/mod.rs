//! Notification sinks.
//!
//! - [`webhook::WebhookDelivery`] -- POST the batch as JSON, with retry.
//! - [`log::LogSink`] -- emit the batch as a structured log line.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use parcel_core::notification::{Correlation, NotificationEvent};
use serde::Serialize;

use crate::recipients::Recipient;

pub use webhook::WebhookError;

/// One coalesced notification: every event of a burst, for one correlation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBatch {
    pub team_id: String,
    pub correlation: Correlation,
    pub primary: Recipient,
    pub cc: Vec<Recipient>,
    pub events: Vec<NotificationEvent>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, batch: &NotificationBatch) -> Result<(), WebhookError>;
}

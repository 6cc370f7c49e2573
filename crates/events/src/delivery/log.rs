use async_trait::async_trait;

use super::{NotificationBatch, NotificationSink, WebhookError};

/// Sink used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, batch: &NotificationBatch) -> Result<(), WebhookError> {
        tracing::info!(
            resource_id = %batch.correlation.resource_id,
            channel = %batch.correlation.channel,
            recipient = %batch.primary.email,
            cc = batch.cc.len(),
            events = batch.events.len(),
            "Notification batch ready (no webhook configured)",
        );
        Ok(())
    }
}

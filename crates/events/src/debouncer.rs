//! Debounced notifications.
//!
//! [`NotificationDebouncer`] records each qualifying event and pushes the
//! correlation's pending trigger out to `window` from now. When a trigger
//! finally fires, [`BatchNotifier`] gathers the burst from the event log and
//! hands one batch to the sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parcel_core::notification::NotificationEvent;

use crate::config::NotificationConfig;
use crate::delivery::{NotificationBatch, NotificationSink};
use crate::error::DebounceError;
use crate::event_log::EventLog;
use crate::recipients::RecipientResolver;
use crate::scheduler::{
    ScheduleError, ScheduleOutcome, Trigger, TriggerHandler, TriggerRequest, TriggerScheduler,
};

/// Upper bound on the reschedule backoff.
const MAX_RESCHEDULE_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// NotificationDebouncer
// ---------------------------------------------------------------------------

pub struct NotificationDebouncer {
    log: Arc<dyn EventLog>,
    scheduler: TriggerScheduler,
    window: Duration,
    reschedule_attempts: u32,
    reschedule_initial_delay: Duration,
}

impl NotificationDebouncer {
    pub fn new(
        log: Arc<dyn EventLog>,
        scheduler: TriggerScheduler,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            log,
            scheduler,
            window: config.window,
            reschedule_attempts: config.reschedule_attempts.max(1),
            reschedule_initial_delay: config.reschedule_initial_delay,
        }
    }

    pub fn scheduler(&self) -> &TriggerScheduler {
        &self.scheduler
    }

    /// Persist `event`, then replace the correlation's pending trigger.
    pub async fn record(&self, event: NotificationEvent) -> Result<ScheduleOutcome, DebounceError> {
        event.correlation.validate()?;
        self.log.append(&event).await?;

        let tags = event.correlation.tags();
        let request = TriggerRequest {
            key: event.correlation.trigger_key(&event.subject_id),
            tags: tags.clone(),
            team_id: event.team_id.clone(),
            correlation: event.correlation.clone(),
            delay: self.window,
        };

        let mut delay = self.reschedule_initial_delay;
        let mut attempt = 1;
        loop {
            match self.scheduler.replace(&tags, request.clone()).await {
                Ok(outcome) => {
                    tracing::debug!(
                        event_id = %event.id,
                        tags = %tags,
                        outcome = ?outcome,
                        "Notification trigger updated",
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < self.reschedule_attempts => {
                    tracing::warn!(attempt, error = %e, tags = %tags, "Reschedule failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RESCHEDULE_DELAY);
                    attempt += 1;
                }
                Err(e) => {
                    if let ScheduleError::Full { .. } = e {
                        tracing::error!(
                            attempts = attempt,
                            error = %e,
                            tags = %tags,
                            "Notification trigger lost after cancelling its predecessor",
                        );
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BatchNotifier
// ---------------------------------------------------------------------------

/// Fires due triggers: collects the burst and delivers one batch.
pub struct BatchNotifier {
    log: Arc<dyn EventLog>,
    recipients: Arc<dyn RecipientResolver>,
    sink: Arc<dyn NotificationSink>,
    lookback: chrono::Duration,
}

impl BatchNotifier {
    pub fn new(
        log: Arc<dyn EventLog>,
        recipients: Arc<dyn RecipientResolver>,
        sink: Arc<dyn NotificationSink>,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            log,
            recipients,
            sink,
            lookback,
        }
    }

    async fn notify(&self, trigger: Trigger) -> Result<(), DebounceError> {
        let correlation = trigger.correlation;
        let since = Utc::now() - self.lookback;
        let events = self.log.list_since(&correlation, since).await?;
        if events.is_empty() {
            tracing::debug!(key = %trigger.key, "No events in lookback window");
            return Ok(());
        }

        let mut recipients = self
            .recipients
            .resolve(&correlation.resource_id, &correlation.channel)
            .await?;
        let Some(primary_idx) = recipients.iter().position(|r| r.is_primary) else {
            tracing::info!(
                resource_id = %correlation.resource_id,
                channel = %correlation.channel,
                "No primary recipient, dropping notification",
            );
            return Ok(());
        };
        let primary = recipients.remove(primary_idx);

        let batch = NotificationBatch {
            team_id: trigger.team_id,
            correlation,
            primary,
            cc: recipients,
            events,
        };
        if let Err(e) = self.sink.deliver(&batch).await {
            tracing::error!(key = %trigger.key, error = %e, "Notification delivery failed");
            return Ok(());
        }

        tracing::info!(
            key = %trigger.key,
            events = batch.events.len(),
            recipient = %batch.primary.email,
            "Notification batch delivered",
        );
        Ok(())
    }
}

#[async_trait]
impl TriggerHandler for BatchNotifier {
    async fn fire(&self, trigger: Trigger) {
        let key = trigger.key.clone();
        if let Err(e) = self.notify(trigger).await {
            tracing::error!(key = %key, error = %e, "Failed to process notification trigger");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

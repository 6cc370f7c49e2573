//! In-process registry of delayed notification triggers.
//!
//! Every pending trigger carries a [`TagSet`]. Lookups address triggers by
//! exact containment: a trigger is affected only when it holds *all* of the
//! required tags, so two correlations that share a resource never cancel
//! each other.
//!
//! [`TriggerScheduler::replace`] cancels matching triggers and registers the
//! replacement under a single lock; no observer can see the window in
//! between.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parcel_core::notification::{Correlation, TagSet};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default cap on simultaneously pending triggers.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A trigger that has come due.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub key: String,
    pub team_id: String,
    pub correlation: Correlation,
}

/// Request to schedule a trigger `delay` from now.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// Idempotency key; a request matching a live trigger's key is a no-op.
    pub key: String,
    pub tags: TagSet,
    pub team_id: String,
    pub correlation: Correlation,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new trigger was registered after cancelling `cancelled` others.
    Scheduled { cancelled: usize },
    /// A live trigger already had this key.
    Collapsed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Trigger scheduler is shut down")]
    ShutDown,

    /// Matching triggers were cancelled but the replacement did not fit.
    #[error("Trigger registry full ({capacity} pending); cancelled {cancelled}")]
    Full { capacity: usize, cancelled: usize },
}

impl ScheduleError {
    /// Whether retrying the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::Full { .. })
    }
}

/// Invoked when a trigger fires.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn fire(&self, trigger: Trigger);
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct PendingTrigger {
    key: String,
    tags: TagSet,
    fire_at: Instant,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    pending: HashMap<u64, PendingTrigger>,
}

impl Registry {
    fn cancel_matching(&mut self, required: &TagSet) -> usize {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, t)| t.tags.contains_all(required))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(trigger) = self.pending.remove(id) {
                trigger.cancel.cancel();
            }
        }
        ids.len()
    }
}

struct Inner {
    registry: Mutex<Registry>,
    handler: Arc<dyn TriggerHandler>,
    shutdown: CancellationToken,
    max_pending: usize,
}

// ---------------------------------------------------------------------------
// TriggerScheduler
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct TriggerScheduler {
    inner: Arc<Inner>,
}

impl TriggerScheduler {
    pub fn new(handler: Arc<dyn TriggerHandler>, max_pending: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                handler,
                shutdown: CancellationToken::new(),
                max_pending,
            }),
        }
    }

    /// Cancel every pending trigger carrying all of `required`, then
    /// schedule `request`. Both steps happen under one lock.
    pub async fn replace(
        &self,
        required: &TagSet,
        request: TriggerRequest,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ScheduleError::ShutDown);
        }

        let mut registry = self.inner.registry.lock().await;

        if registry.pending.values().any(|t| t.key == request.key) {
            tracing::debug!(key = %request.key, "Trigger already pending, collapsing");
            return Ok(ScheduleOutcome::Collapsed);
        }

        let cancelled = registry.cancel_matching(required);

        if registry.pending.len() >= self.inner.max_pending {
            return Err(ScheduleError::Full {
                capacity: self.inner.max_pending,
                cancelled,
            });
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let cancel = self.inner.shutdown.child_token();
        let fire_at = Instant::now() + request.delay;
        registry.pending.insert(
            id,
            PendingTrigger {
                key: request.key.clone(),
                tags: request.tags,
                fire_at,
                cancel: cancel.clone(),
            },
        );
        drop(registry);

        let trigger = Trigger {
            key: request.key,
            team_id: request.team_id,
            correlation: request.correlation,
        };
        tracing::debug!(key = %trigger.key, cancelled, delay_secs = request.delay.as_secs(), "Trigger scheduled");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(fire_at) => {
                    // Only the task that removes its own entry may fire.
                    let due = inner.registry.lock().await.pending.remove(&id).is_some();
                    if due {
                        inner.handler.fire(trigger).await;
                    }
                }
            }
        });

        Ok(ScheduleOutcome::Scheduled { cancelled })
    }

    /// Cancel every pending trigger carrying all of `required`.
    pub async fn cancel_matching(&self, required: &TagSet) -> usize {
        self.inner.registry.lock().await.cancel_matching(required)
    }

    /// Keys and fire times of triggers carrying all of `required`.
    pub async fn pending(&self, required: &TagSet) -> Vec<(String, Instant)> {
        self.inner
            .registry
            .lock()
            .await
            .pending
            .values()
            .filter(|t| t.tags.contains_all(required))
            .map(|t| (t.key.clone(), t.fire_at))
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.registry.lock().await.pending.len()
    }

    /// Cancel everything and refuse further scheduling.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut registry = self.inner.registry.lock().await;
        let dropped = registry.pending.len();
        registry.pending.clear();
        tracing::info!(dropped, "Trigger scheduler shut down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::time::Duration;

use crate::scheduler::DEFAULT_MAX_PENDING;

/// Debounce and delivery configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Quiet period after the last event before a batch fires.
    pub window: Duration,
    /// How far back a firing trigger collects events.
    pub lookback: chrono::Duration,
    /// Webhook receiving batches; batches are only logged when unset.
    pub webhook_url: Option<String>,
    /// Attempts at rescheduling after the registry rejects a trigger.
    pub reschedule_attempts: u32,
    pub reschedule_initial_delay: Duration,
    pub max_pending: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            lookback: chrono::Duration::minutes(60),
            webhook_url: None,
            reschedule_attempts: 5,
            reschedule_initial_delay: Duration::from_millis(200),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl NotificationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default  |
    /// |--------------------------------|----------|
    /// | `NOTIFY_WINDOW_SECS`           | `300`    |
    /// | `NOTIFY_LOOKBACK_MINUTES`      | `60`     |
    /// | `NOTIFY_WEBHOOK_URL`           | (unset)  |
    /// | `NOTIFY_RESCHEDULE_ATTEMPTS`   | `5`      |
    /// | `NOTIFY_MAX_PENDING`           | `10000`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let window_secs: u64 = std::env::var("NOTIFY_WINDOW_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("NOTIFY_WINDOW_SECS must be a valid u64");

        let lookback_minutes: i64 = std::env::var("NOTIFY_LOOKBACK_MINUTES")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("NOTIFY_LOOKBACK_MINUTES must be a valid i64");

        let webhook_url = std::env::var("NOTIFY_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let reschedule_attempts: u32 = std::env::var("NOTIFY_RESCHEDULE_ATTEMPTS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("NOTIFY_RESCHEDULE_ATTEMPTS must be a valid u32");

        let max_pending: usize = std::env::var("NOTIFY_MAX_PENDING")
            .unwrap_or_else(|_| DEFAULT_MAX_PENDING.to_string())
            .parse()
            .expect("NOTIFY_MAX_PENDING must be a valid usize");

        Self {
            window: Duration::from_secs(window_secs),
            lookback: chrono::Duration::minutes(lookback_minutes),
            webhook_url,
            reschedule_attempts: reschedule_attempts.max(1),
            reschedule_initial_delay: defaults.reschedule_initial_delay,
            max_pending,
        }
    }
}

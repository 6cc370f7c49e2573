//! Debounced notifications for Parcel.
//!
//! - [`TriggerScheduler`] -- tag-addressed registry of delayed triggers with
//!   atomic cancel-and-replace.
//! - [`NotificationDebouncer`] -- records events and pushes their trigger out.
//! - [`BatchNotifier`] -- fires due triggers as one batch per burst.
//! - [`delivery`] -- notification sinks (webhook, log).

pub mod config;
pub mod debouncer;
pub mod delivery;
pub mod error;
pub mod event_log;
pub mod recipients;
pub mod scheduler;

pub use config::NotificationConfig;
pub use debouncer::{BatchNotifier, NotificationDebouncer};
pub use delivery::log::LogSink;
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use delivery::{NotificationBatch, NotificationSink};
pub use error::DebounceError;
pub use event_log::{EventLog, MemoryEventLog, PgEventLog};
pub use recipients::{PgRecipientResolver, Recipient, RecipientResolver, StaticRecipients};
pub use scheduler::{ScheduleError, ScheduleOutcome, Trigger, TriggerHandler, TriggerScheduler};

use parcel_core::error::CoreError;

use crate::scheduler::ScheduleError;

#[derive(Debug, thiserror::Error)]
pub enum DebounceError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Notification storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl From<sqlx::Error> for DebounceError {
    fn from(e: sqlx::Error) -> Self {
        DebounceError::Storage(e.to_string())
    }
}

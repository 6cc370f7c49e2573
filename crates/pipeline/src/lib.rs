//! Job execution: partitioning, backend dispatch and input recovery.

pub mod config;
pub mod dispatcher;
pub mod docx;
pub mod partition;
pub mod recovery;

pub use config::DispatchConfig;
pub use dispatcher::{DispatchError, DispatchOutcome, JobDispatcher};
pub use recovery::{DocxSanitizeRecovery, RecoveryRegistry, RecoveryStrategy};

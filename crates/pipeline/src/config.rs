use std::time::Duration;

use crate::docx::SanitizeMode;
use crate::partition::DEFAULT_MAX_FILES_PER_PART;

/// Slack added to the stall threshold on top of the invocation budget.
const STALL_MARGIN_SECS: u64 = 60;

/// Dispatcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Hard ceiling on a single backend invocation (default: 300 s).
    pub backend_timeout: Duration,
    /// How long COMPLETED jobs are retained (default: 72 h).
    pub retention: chrono::Duration,
    /// How long FAILED jobs are retained (default: 24 h).
    pub failed_retention: chrono::Duration,
    /// Source keys per backend invocation (default: 500).
    pub max_files_per_part: usize,
    /// Fixes applied by DOCX recovery (default: `all`).
    pub sanitize_mode: SanitizeMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(300),
            retention: chrono::Duration::hours(72),
            failed_retention: chrono::Duration::hours(24),
            max_files_per_part: DEFAULT_MAX_FILES_PER_PART,
            sanitize_mode: SanitizeMode::All,
        }
    }
}

impl DispatchConfig {
    /// PROCESSING jobs without an update for this long are presumed abandoned.
    ///
    /// One part may take two invocations (the original and a recovery retry).
    pub fn stall_threshold(&self) -> chrono::Duration {
        let secs = self
            .backend_timeout
            .as_secs()
            .saturating_mul(2)
            .saturating_add(STALL_MARGIN_SECS);
        chrono::Duration::seconds(secs.min(i64::MAX as u64 / 1_000) as i64)
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `JOB_BACKEND_TIMEOUT_SECS`    | `300`   |
    /// | `JOB_RETENTION_HOURS`         | `72`    |
    /// | `JOB_FAILED_RETENTION_HOURS`  | `24`    |
    /// | `JOB_MAX_FILES_PER_PART`      | `500`   |
    /// | `DOCX_SANITIZE_MODE`          | `all`   |
    pub fn from_env() -> Self {
        let backend_timeout_secs: u64 = std::env::var("JOB_BACKEND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("JOB_BACKEND_TIMEOUT_SECS must be a valid u64");

        let retention_hours: i64 = std::env::var("JOB_RETENTION_HOURS")
            .unwrap_or_else(|_| "72".into())
            .parse()
            .expect("JOB_RETENTION_HOURS must be a valid i64");

        let failed_retention_hours: i64 = std::env::var("JOB_FAILED_RETENTION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .expect("JOB_FAILED_RETENTION_HOURS must be a valid i64");

        let max_files_per_part: usize = std::env::var("JOB_MAX_FILES_PER_PART")
            .unwrap_or_else(|_| DEFAULT_MAX_FILES_PER_PART.to_string())
            .parse()
            .expect("JOB_MAX_FILES_PER_PART must be a valid usize");
        assert!(max_files_per_part > 0, "JOB_MAX_FILES_PER_PART must be positive");

        let sanitize_mode: SanitizeMode = std::env::var("DOCX_SANITIZE_MODE")
            .unwrap_or_else(|_| "all".into())
            .parse()
            .expect("DOCX_SANITIZE_MODE must be one of: rtl, sdt, all");

        Self {
            backend_timeout: Duration::from_secs(backend_timeout_secs),
            retention: chrono::Duration::hours(retention_hours),
            failed_retention: chrono::Duration::hours(failed_retention_hours),
            max_files_per_part,
            sanitize_mode,
        }
    }
}

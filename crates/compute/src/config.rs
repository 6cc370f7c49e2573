use std::collections::HashMap;
use std::time::Duration;

use parcel_core::job::JobKind;

use crate::retry::RetryPolicy;

/// Compute backend configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Endpoint per job kind.
    pub endpoints: HashMap<JobKind, String>,
    /// Optional bearer token sent to the backend.
    pub auth_token: Option<String>,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl ComputeConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                               |
    /// |----------------------------------|---------------------------------------|
    /// | `COMPUTE_BUNDLE_URL`             | `http://localhost:9000/bundle`        |
    /// | `COMPUTE_VISIT_EXPORT_URL`       | `http://localhost:9000/visit-export`  |
    /// | `COMPUTE_AUTH_TOKEN`             | unset                                 |
    /// | `COMPUTE_MAX_ATTEMPTS`           | `3`                                   |
    /// | `COMPUTE_RETRY_INITIAL_MS`       | `1000`                                |
    pub fn from_env() -> Self {
        let bundle_url = std::env::var("COMPUTE_BUNDLE_URL")
            .unwrap_or_else(|_| "http://localhost:9000/bundle".into());
        let visit_export_url = std::env::var("COMPUTE_VISIT_EXPORT_URL")
            .unwrap_or_else(|_| "http://localhost:9000/visit-export".into());

        let auth_token = std::env::var("COMPUTE_AUTH_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        let max_attempts: u32 = std::env::var("COMPUTE_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("COMPUTE_MAX_ATTEMPTS must be a valid u32");
        assert!(max_attempts >= 1, "COMPUTE_MAX_ATTEMPTS must be at least 1");

        let initial_ms: u64 = std::env::var("COMPUTE_RETRY_INITIAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("COMPUTE_RETRY_INITIAL_MS must be a valid u64");

        Self {
            endpoints: HashMap::from([
                (JobKind::DocumentBundle, bundle_url),
                (JobKind::VisitExport, visit_export_url),
            ]),
            auth_token,
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_millis(initial_ms),
                ..Default::default()
            },
        }
    }
}

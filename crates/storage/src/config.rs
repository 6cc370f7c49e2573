use std::time::Duration;

use crate::access::DEFAULT_URL_TTL;
use crate::url::{DEFAULT_BASE_DOMAIN, DEFAULT_REGION};

/// Blob-storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base domain of storage hosts (default: `example`).
    pub base_domain: String,
    /// Region assumed by region-less hosts (default: `us-east-1`).
    pub default_region: String,
    /// Long-lived access key used to mint URLs.
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Lifetime of minted URLs (default: 72 h).
    pub url_ttl: Duration,
    /// Endpoint override for object reads/writes (e.g. a local MinIO).
    pub endpoint_override: Option<String>,
}

impl StorageConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default     |
    /// |--------------------------------|-------------|
    /// | `STORAGE_BASE_DOMAIN`          | `example`   |
    /// | `STORAGE_DEFAULT_REGION`       | `us-east-1` |
    /// | `STORAGE_ACCESS_KEY_ID`        | (required)  |
    /// | `STORAGE_SECRET_ACCESS_KEY`    | (required)  |
    /// | `STORAGE_URL_TTL_HOURS`        | `72`        |
    /// | `STORAGE_ENDPOINT_OVERRIDE`    | unset       |
    pub fn from_env() -> Self {
        let base_domain =
            std::env::var("STORAGE_BASE_DOMAIN").unwrap_or_else(|_| DEFAULT_BASE_DOMAIN.into());
        let default_region =
            std::env::var("STORAGE_DEFAULT_REGION").unwrap_or_else(|_| DEFAULT_REGION.into());

        let access_key_id = std::env::var("STORAGE_ACCESS_KEY_ID")
            .expect("STORAGE_ACCESS_KEY_ID must be set");
        let secret_access_key = std::env::var("STORAGE_SECRET_ACCESS_KEY")
            .expect("STORAGE_SECRET_ACCESS_KEY must be set");

        let url_ttl = match std::env::var("STORAGE_URL_TTL_HOURS") {
            Ok(v) => {
                let hours: u64 = v.parse().expect("STORAGE_URL_TTL_HOURS must be a valid u64");
                assert!(
                    (1..=168).contains(&hours),
                    "STORAGE_URL_TTL_HOURS must be between 1 and 168"
                );
                Duration::from_secs(hours * 3600)
            }
            Err(_) => DEFAULT_URL_TTL,
        };

        let endpoint_override = std::env::var("STORAGE_ENDPOINT_OVERRIDE")
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            base_domain,
            default_region,
            access_key_id,
            secret_access_key,
            url_ttl,
            endpoint_override,
        }
    }
}

use crate::auth::jwt::JwtConfig;
use crate::auth::secret::InternalSecret;

/// Server configuration loaded from environment variables.
///
/// All fields except the secrets have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background tasks get to stop after the server (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub jwt: JwtConfig,
    /// Bearer secret guarding `/api/v1/internal/*`.
    pub internal_secret: InternalSecret,
    /// Bucket used when a create request names none (default: `uploads`).
    pub default_source_bucket: String,
    /// How long FAILED jobs stay listed after creation (default: `60`).
    pub failed_visibility_mins: i64,
    /// Interval of the expired-job sweep in seconds (default: `3600`).
    pub retention_sweep_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `INTERNAL_API_SECRET`    | (required)                 |
    /// | `DEFAULT_SOURCE_BUCKET`  | `uploads`                  |
    /// | `FAILED_VISIBILITY_MINS` | `60`                       |
    /// | `RETENTION_SWEEP_SECS`   | `3600`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let jwt = JwtConfig::from_env();

        let internal_secret =
            std::env::var("INTERNAL_API_SECRET").expect("INTERNAL_API_SECRET must be set");
        assert!(
            internal_secret.len() >= 16,
            "INTERNAL_API_SECRET must be at least 16 characters"
        );

        let default_source_bucket =
            std::env::var("DEFAULT_SOURCE_BUCKET").unwrap_or_else(|_| "uploads".into());

        let failed_visibility_mins: i64 = std::env::var("FAILED_VISIBILITY_MINS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("FAILED_VISIBILITY_MINS must be a valid i64");

        let retention_sweep_secs: u64 = std::env::var("RETENTION_SWEEP_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("RETENTION_SWEEP_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
            internal_secret: InternalSecret::new(&internal_secret),
            default_source_bucket,
            failed_visibility_mins,
            retention_sweep_secs,
        }
    }
}

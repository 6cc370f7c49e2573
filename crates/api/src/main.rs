use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parcel_compute::config::ComputeConfig;
use parcel_compute::HttpComputeBackend;
use parcel_core::visibility::VisibilityRules;
use parcel_db::PgJobStore;
use parcel_events::{
    BatchNotifier, LogSink, NotificationConfig, NotificationDebouncer, NotificationSink,
    PgEventLog, PgRecipientResolver, TriggerScheduler, WebhookDelivery,
};
use parcel_pipeline::{DispatchConfig, DocxSanitizeRecovery, JobDispatcher, RecoveryRegistry};
use parcel_storage::config::StorageConfig;
use parcel_storage::{AccessManager, S3ObjectStore, S3Presigner, StaticScopeCredentials, StorageUrlFormat};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parcel_api::background;
use parcel_api::config::ServerConfig;
use parcel_api::router::build_app_router;
use parcel_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parcel_api=debug,parcel_pipeline=debug,parcel_events=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let storage_config = StorageConfig::from_env();
    let compute_config = ComputeConfig::from_env();
    let dispatch_config = DispatchConfig::from_env();
    let notification_config = NotificationConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = parcel_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    parcel_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    parcel_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgJobStore::new(pool.clone()));

    // --- Storage ---
    let url_format =
        StorageUrlFormat::new(&storage_config.base_domain, &storage_config.default_region);
    let presigner = S3Presigner::new(
        url_format.clone(),
        Arc::new(StaticScopeCredentials::new(
            storage_config.access_key_id.clone(),
            storage_config.secret_access_key.clone(),
        )),
    );
    let access = Arc::new(AccessManager::new(
        url_format.clone(),
        Arc::new(presigner),
        storage_config.url_ttl,
    ));
    let objects = Arc::new(
        S3ObjectStore::from_env(
            &storage_config.default_region,
            storage_config.endpoint_override.clone(),
        )
        .await,
    );

    // --- Dispatcher ---
    let backend = HttpComputeBackend::new(compute_config.endpoints, compute_config.retry)
        .with_auth_token(compute_config.auth_token);
    let recovery = RecoveryRegistry::new().with(Arc::new(DocxSanitizeRecovery::new(
        objects,
        dispatch_config.sanitize_mode,
    )));
    let dispatcher = Arc::new(JobDispatcher::new(
        store.clone(),
        Arc::new(backend),
        url_format,
        recovery,
        dispatch_config,
    ));

    // --- Notifications ---
    let event_log = Arc::new(PgEventLog::new(pool.clone()));
    let sink: Arc<dyn NotificationSink> = match &notification_config.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Notification batches delivered by webhook");
            Arc::new(WebhookDelivery::new(url.clone()))
        }
        None => Arc::new(LogSink),
    };
    let notifier = Arc::new(BatchNotifier::new(
        event_log.clone(),
        Arc::new(PgRecipientResolver::new(pool.clone())),
        sink,
        notification_config.lookback,
    ));
    let scheduler = TriggerScheduler::new(notifier, notification_config.max_pending);
    let debouncer = Arc::new(NotificationDebouncer::new(
        event_log,
        scheduler.clone(),
        &notification_config,
    ));

    // --- Background tasks ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(background::job_retention::run(
        store.clone(),
        dispatcher.clone(),
        Duration::from_secs(config.retention_sweep_secs),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        store,
        dispatcher,
        access,
        debouncer,
        visibility: VisibilityRules::new(chrono::Duration::minutes(config.failed_visibility_mins)),
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        retention_handle,
    )
    .await;
    tracing::info!("Retention sweep stopped");

    scheduler.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

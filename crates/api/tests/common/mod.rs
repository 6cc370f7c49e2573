#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use parcel_api::auth::jwt::{generate_token, JwtConfig};
use parcel_api::auth::secret::InternalSecret;
use parcel_api::config::ServerConfig;
use parcel_api::router::build_app_router;
use parcel_api::state::AppState;
use parcel_compute::{BackendOutput, BackendRequest, ComputeBackend, ComputeError};
use parcel_core::job::{Actor, Job, JobKind};
use parcel_core::types::JobId;
use parcel_core::visibility::VisibilityRules;
use parcel_db::{JobStore, MemoryJobStore};
use parcel_events::{
    BatchNotifier, LogSink, MemoryEventLog, NotificationConfig, NotificationDebouncer,
    StaticRecipients, TriggerScheduler,
};
use parcel_pipeline::{DispatchConfig, JobDispatcher, RecoveryRegistry};
use parcel_storage::access::DEFAULT_URL_TTL;
use parcel_storage::{AccessManager, S3Presigner, StaticScopeCredentials, StorageUrlFormat};
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";
pub const INTERNAL_SECRET: &str = "internal-secret-for-tests";
pub const TEAM: &str = "team_1";

/// Virtual-hosted artifact URL the fake backend reports for every part.
pub const ARTIFACT_URL: &str =
    "https://bucket1.storage.us-east-1.example/exports/x.zip?X-Amz-Signature=backend";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            token_expiry_mins: 15,
        },
        internal_secret: InternalSecret::new(INTERNAL_SECRET),
        default_source_bucket: "uploads".to_string(),
        failed_visibility_mins: 60,
        retention_sweep_secs: 3600,
    }
}

/// Compute backend that succeeds with [`ARTIFACT_URL`] and counts calls.
#[derive(Default)]
pub struct FakeBackend {
    pub calls: AtomicUsize,
}

impl FakeBackend {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeBackend for FakeBackend {
    async fn invoke(
        &self,
        _kind: JobKind,
        _request: &BackendRequest,
    ) -> Result<BackendOutput, ComputeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BackendOutput {
            object_ref: None,
            download_url: Some(ARTIFACT_URL.to_string()),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryJobStore>,
    pub backend: Arc<FakeBackend>,
}

/// Build the full application router over in-memory collaborators.
///
/// Uses the same middleware stack as production via [`build_app_router`].
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryJobStore::new());
    let backend = Arc::new(FakeBackend::default());

    let format = StorageUrlFormat::default();
    let presigner = S3Presigner::new(
        format.clone(),
        Arc::new(StaticScopeCredentials::new("AKIDTEST", "test-secret-key")),
    );
    let access = Arc::new(AccessManager::new(
        format.clone(),
        Arc::new(presigner),
        DEFAULT_URL_TTL,
    ));

    let dispatcher = Arc::new(JobDispatcher::new(
        store.clone(),
        backend.clone(),
        format,
        RecoveryRegistry::new(),
        DispatchConfig::default(),
    ));

    let notification_config = NotificationConfig::default();
    let event_log = Arc::new(MemoryEventLog::new());
    let notifier = Arc::new(BatchNotifier::new(
        event_log.clone(),
        Arc::new(StaticRecipients::default()),
        Arc::new(LogSink),
        notification_config.lookback,
    ));
    let scheduler = TriggerScheduler::new(notifier, notification_config.max_pending);
    let debouncer = Arc::new(NotificationDebouncer::new(
        event_log,
        scheduler,
        &notification_config,
    ));

    let state = AppState {
        store: store.clone(),
        dispatcher,
        access,
        debouncer,
        visibility: VisibilityRules::default(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        backend,
    }
}

pub fn user(id: &str) -> Actor {
    Actor::User {
        user_id: id.to_string(),
    }
}

pub fn token_for(actor: &Actor) -> String {
    generate_token(actor, TEAM, &test_config().jwt).unwrap()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, token: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the store until the job reaches a terminal status.
pub async fn wait_for_terminal(store: &MemoryJobStore, id: JobId) -> Job {
    for _ in 0..200 {
        if let Some(job) = store.get(id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not reach a terminal status");
}

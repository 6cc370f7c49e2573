//! Job dispatcher.
//!
//! Moves a PENDING job through the compute backend: claims it, invokes the
//! backend once per part under a hard timeout, and records the terminal
//! state. The claim is an atomic `PENDING -> PROCESSING` update, so a job is
//! handed to the backend at most once no matter how many dispatch attempts
//! race for it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parcel_compute::{BackendOutput, BackendRequest, ComputeBackend, ComputeError};
use parcel_core::error::CoreError;
use parcel_core::job::{Job, JobProgress, JobStatus};
use parcel_core::object_ref::ObjectRef;
use parcel_core::types::{JobId, Timestamp};
use parcel_db::{JobMutator, JobStore, StoreError};
use parcel_storage::StorageUrlFormat;
use tokio::task::JoinHandle;

use crate::config::DispatchConfig;
use crate::partition::partition;
use crate::recovery::RecoveryRegistry;

/// Prefix of the error message stored on timed-out jobs.
pub const BACKEND_TIMEOUT: &str = "BackendTimeout";

/// Prefix of the error message stored on backend failures.
pub const BACKEND_ERROR: &str = "BackendError";

/// Delays between attempts at recording job state (250 ms, 500 ms, 1 s).
const STORE_RETRY_DELAYS_MS: [u64; 3] = [250, 500, 1_000];

/// Stalled jobs failed per sweep.
const STALL_BATCH: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed { parts: usize },
    Failed { reason: String },
    /// The job was not PENDING; nothing was sent to the backend.
    Skipped { status: JobStatus },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why one part failed.
enum PartFailure {
    Timeout,
    Backend(String),
}

impl PartFailure {
    fn message(&self, timeout_secs: u64) -> String {
        match self {
            PartFailure::Timeout => {
                format!("{BACKEND_TIMEOUT}: no response within {timeout_secs}s")
            }
            PartFailure::Backend(msg) => format!("{BACKEND_ERROR}: {msg}"),
        }
    }
}

pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn ComputeBackend>,
    url_format: StorageUrlFormat,
    recovery: RecoveryRegistry,
    config: DispatchConfig,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        backend: Arc<dyn ComputeBackend>,
        url_format: StorageUrlFormat,
        recovery: RecoveryRegistry,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            backend,
            url_format,
            recovery,
            config,
        }
    }

    /// Dispatch on a background task; the caller never waits on the backend.
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            match dispatcher.dispatch(job_id).await {
                Ok(outcome) => {
                    tracing::debug!(job_id = %job_id, outcome = ?outcome, "Dispatch finished");
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Dispatch aborted");
                }
            }
        })
    }

    /// Run a job to a terminal state.
    pub async fn dispatch(&self, job_id: JobId) -> Result<DispatchOutcome, DispatchError> {
        let job = match self.claim(job_id).await? {
            Ok(job) => job,
            Err(status) => {
                tracing::info!(job_id = %job_id, status = %status, "Job not pending, skipping dispatch");
                return Ok(DispatchOutcome::Skipped { status });
            }
        };

        let requests = partition(&job.params, self.config.max_files_per_part);
        let total = requests.len();
        tracing::info!(
            job_id = %job_id,
            kind = job.kind.as_str(),
            parts = total,
            "Job claimed, invoking backend",
        );

        let mut object_refs = Vec::with_capacity(total);
        let mut access_urls = Vec::with_capacity(total);

        for (i, request) in requests.into_iter().enumerate() {
            let output = match self.invoke_part(&job, request).await {
                Ok(output) => output,
                Err(failure) => {
                    let reason = failure.message(self.config.backend_timeout.as_secs());
                    return self.fail(job_id, reason).await;
                }
            };

            let (object_ref, url) = match self.resolve_output(output) {
                Ok(resolved) => resolved,
                Err(reason) => return self.fail(job_id, reason).await,
            };
            object_refs.push(object_ref);
            access_urls.push(url);

            if i + 1 < total {
                let completed = (i + 1) as u32;
                self.record(job_id, || -> JobMutator<'static> {
                    Box::new(move |job: &mut Job| {
                        job.progress = Some(JobProgress {
                            completed_parts: completed,
                            total_parts: total as u32,
                        });
                        Ok(())
                    })
                })
                .await?;
                tracing::debug!(job_id = %job_id, completed, total, "Part finished");
            }
        }

        let now = Utc::now();
        let retention = self.config.retention;
        self.record(job_id, || -> JobMutator<'static> {
            let object_refs = object_refs.clone();
            let access_urls = access_urls.clone();
            Box::new(move |job: &mut Job| {
                job.transition(JobStatus::Completed)?;
                job.object_refs = object_refs;
                job.access_urls = access_urls;
                job.progress = Some(JobProgress {
                    completed_parts: total as u32,
                    total_parts: total as u32,
                });
                job.completed_at = Some(now);
                job.expires_at = Some(now + retention);
                Ok(())
            })
        })
        .await?;

        tracing::info!(job_id = %job_id, parts = total, "Job completed");
        Ok(DispatchOutcome::Completed { parts: total })
    }

    /// Atomically move the job from PENDING to PROCESSING.
    ///
    /// `Ok(Err(status))` means the job was found in another status.
    async fn claim(&self, job_id: JobId) -> Result<Result<Job, JobStatus>, DispatchError> {
        let max_files = self.config.max_files_per_part;
        let claimed = self
            .store
            .update(
                job_id,
                Box::new(move |job: &mut Job| {
                    if job.status != JobStatus::Pending {
                        return Err(CoreError::InvalidTransition {
                            from: job.status,
                            to: JobStatus::Processing,
                        });
                    }
                    let parts = partition(&job.params, max_files).len() as u32;
                    job.transition(JobStatus::Processing)?;
                    job.progress = Some(JobProgress {
                        completed_parts: 0,
                        total_parts: parts,
                    });
                    Ok(())
                }),
            )
            .await;

        match claimed {
            Ok(job) => Ok(Ok(job)),
            Err(StoreError::Rejected(CoreError::InvalidTransition { from, .. })) => Ok(Err(from)),
            Err(e) => Err(e.into()),
        }
    }

    /// Invoke one part under the timeout, with at most one recovery retry.
    async fn invoke_part(&self, job: &Job, request: BackendRequest) -> Result<BackendOutput, PartFailure> {
        let error = match self.invoke_with_timeout(job, &request).await? {
            Ok(output) => return Ok(output),
            Err(e) => e,
        };

        let Some(strategy) = self.recovery.find(&request, &error) else {
            tracing::warn!(job_id = %job.id, error = %error, "Backend invocation failed");
            return Err(PartFailure::Backend(error.to_string()));
        };

        tracing::warn!(
            job_id = %job.id,
            strategy = strategy.name(),
            error = %error,
            "Backend invocation failed, attempting recovery",
        );
        let recovered = match strategy.recover(&request).await {
            Ok(recovered) => recovered,
            Err(e) => {
                tracing::error!(job_id = %job.id, strategy = strategy.name(), error = %e, "Recovery failed");
                return Err(PartFailure::Backend(error.to_string()));
            }
        };

        match self.invoke_with_timeout(job, &recovered).await? {
            Ok(output) => {
                tracing::info!(job_id = %job.id, strategy = strategy.name(), "Recovered invocation succeeded");
                Ok(output)
            }
            Err(e) => Err(PartFailure::Backend(e.to_string())),
        }
    }

    async fn invoke_with_timeout(
        &self,
        job: &Job,
        request: &BackendRequest,
    ) -> Result<Result<BackendOutput, ComputeError>, PartFailure> {
        tokio::time::timeout(
            self.config.backend_timeout,
            self.backend.invoke(job.kind, request),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                job_id = %job.id,
                timeout_secs = self.config.backend_timeout.as_secs(),
                "Backend invocation timed out",
            );
            PartFailure::Timeout
        })
    }

    /// Prefer the structured reference; fall back to parsing the URL.
    fn resolve_output(&self, output: BackendOutput) -> Result<(ObjectRef, String), String> {
        let url = output.download_url.unwrap_or_default();
        if let Some(object_ref) = output.object_ref {
            return Ok((object_ref, url));
        }
        match self.url_format.parse(&url) {
            Ok(object_ref) => Ok((object_ref, url)),
            Err(e) => Err(format!("{BACKEND_ERROR}: {e}")),
        }
    }

    async fn fail(&self, job_id: JobId, reason: String) -> Result<DispatchOutcome, DispatchError> {
        let now = Utc::now();
        let failed_retention = self.config.failed_retention;
        self.record(job_id, || -> JobMutator<'static> {
            let message = reason.clone();
            Box::new(move |job: &mut Job| {
                job.transition(JobStatus::Failed)?;
                job.error_message = Some(message);
                job.expires_at = Some(now + failed_retention);
                Ok(())
            })
        })
        .await?;

        tracing::warn!(job_id = %job_id, reason = %reason, "Job failed");
        Ok(DispatchOutcome::Failed { reason })
    }

    /// Apply a state-recording update, retrying transient store failures.
    ///
    /// `mutator` builds a fresh closure for every attempt.
    async fn record<F>(&self, job_id: JobId, mutator: F) -> Result<Job, StoreError>
    where
        F: Fn() -> JobMutator<'static>,
    {
        for (attempt, delay_ms) in STORE_RETRY_DELAYS_MS.iter().enumerate() {
            match self.store.update(job_id, mutator()).await {
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Recording job state failed, retrying",
                    );
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                other => return other,
            }
        }

        // Final attempt after the last backoff.
        self.store.update(job_id, mutator()).await.inspect_err(|e| {
            tracing::error!(job_id = %job_id, error = %e, "Recording job state failed after all retries");
        })
    }

    /// Fail PROCESSING jobs that have not been updated within the stall
    /// threshold, e.g. after a crash mid-dispatch.
    ///
    /// Returns the number of jobs moved to FAILED.
    pub async fn fail_stalled(&self, now: Timestamp) -> Result<usize, DispatchError> {
        let threshold = self.config.stall_threshold();
        let cutoff = now - threshold;
        let stalled = self.store.list_stalled(cutoff, STALL_BATCH).await?;

        let reason = format!(
            "{BACKEND_TIMEOUT}: no progress recorded for {}s",
            threshold.num_seconds()
        );
        let expires_at = now + self.config.failed_retention;
        let mut failed = 0;

        for job in stalled {
            let message = reason.clone();
            let result = self
                .store
                .update(
                    job.id,
                    Box::new(move |current: &mut Job| {
                        if current.status != JobStatus::Processing || current.updated_at >= cutoff {
                            return Err(CoreError::Conflict("Job is no longer stalled".into()));
                        }
                        current.transition(JobStatus::Failed)?;
                        current.error_message = Some(message);
                        current.expires_at = Some(expires_at);
                        Ok(())
                    }),
                )
                .await;

            match result {
                Ok(_) => {
                    tracing::warn!(job_id = %job.id, stalled_since = %job.updated_at, "Stalled job failed");
                    failed += 1;
                }
                Err(StoreError::Rejected(_) | StoreError::NotFound(_)) => {
                    tracing::debug!(job_id = %job.id, "Job resumed or finished before the stall sweep");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Cursor, Write};
    use std::ops::Range;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parcel_core::job::{Actor, JobKind, JobParams, NewJob};
    use parcel_db::{CreateOutcome, ListScope, MemoryJobStore};
    use parcel_storage::{MemoryObjectStore, ObjectStore};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::docx::SanitizeMode;
    use crate::recovery::DocxSanitizeRecovery;

    /// Replays scripted results and records every request it receives.
    #[derive(Default)]
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<BackendOutput, ComputeError>>>,
        calls: Mutex<Vec<BackendRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<BackendOutput, ComputeError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<BackendRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ComputeBackend for ScriptedBackend {
        async fn invoke(
            &self,
            _kind: JobKind,
            request: &BackendRequest,
        ) -> Result<BackendOutput, ComputeError> {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ComputeError::Backend("script exhausted".into())))
        }
    }

    /// Memory store whose `update` calls numbered in `failing` report the
    /// store as unreachable. Call 0 is the claim.
    struct FlakyStore {
        inner: Arc<MemoryJobStore>,
        updates: AtomicUsize,
        failing: Range<usize>,
    }

    impl FlakyStore {
        fn new(inner: Arc<MemoryJobStore>, failing: Range<usize>) -> Self {
            Self {
                inner,
                updates: AtomicUsize::new(0),
                failing,
            }
        }
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn create(&self, new: NewJob) -> Result<CreateOutcome, StoreError> {
            self.inner.create(new).await
        }

        async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
            self.inner.get(id).await
        }

        async fn list_by_resource(
            &self,
            resource_id: &str,
            scope: &ListScope,
            limit: Option<i64>,
        ) -> Result<Vec<Job>, StoreError> {
            self.inner.list_by_resource(resource_id, scope, limit).await
        }

        async fn update(&self, id: JobId, mutator: JobMutator<'_>) -> Result<Job, StoreError> {
            let n = self.updates.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&n) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.update(id, mutator).await
        }

        async fn list_stalled(
            &self,
            updated_before: Timestamp,
            limit: i64,
        ) -> Result<Vec<Job>, StoreError> {
            self.inner.list_stalled(updated_before, limit).await
        }

        async fn evict_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
            self.inner.evict_expired(now).await
        }

        async fn health_check(&self) -> Result<(), StoreError> {
            self.inner.health_check().await
        }
    }

    fn url_output(key: &str) -> Result<BackendOutput, ComputeError> {
        Ok(BackendOutput {
            object_ref: None,
            download_url: Some(format!(
                "https://storage.us-east-1.example/exports/{key}?X-Amz-Signature=abc"
            )),
        })
    }

    fn new_job(files: &[&str]) -> NewJob {
        NewJob {
            kind: JobKind::DocumentBundle,
            resource_id: "dr_1".into(),
            team_id: "team_1".into(),
            actor: Actor::User {
                user_id: "u_1".into(),
            },
            params: JobParams {
                source_bucket: "uploads".into(),
                source_objects: files.iter().map(|f| f.to_string()).collect(),
                folder_structure: serde_json::json!({}),
                transform: None,
                output_name: "bundle".into(),
                expiration_hours: 72,
            },
            idempotency_key: None,
        }
    }

    fn dispatcher(
        store: Arc<MemoryJobStore>,
        backend: Arc<ScriptedBackend>,
        recovery: RecoveryRegistry,
        config: DispatchConfig,
    ) -> JobDispatcher {
        JobDispatcher::new(store, backend, StorageUrlFormat::default(), recovery, config)
    }

    async fn create(store: &MemoryJobStore, files: &[&str]) -> JobId {
        store.create(new_job(files)).await.unwrap().job.id
    }

    #[tokio::test]
    async fn successful_dispatch_completes_with_parsed_ref() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("bundle.zip")]));
        let id = create(&store, &["a.pdf", "b.pdf"]).await;

        let outcome = dispatcher(
            store.clone(),
            backend.clone(),
            RecoveryRegistry::new(),
            DispatchConfig::default(),
        )
        .dispatch(id)
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { parts: 1 });
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.object_refs, [ObjectRef::new("exports", "bundle.zip", "us-east-1")]);
        assert_eq!(job.access_urls.len(), 1);
        assert!(job.completed_at.is_some());
        let retained = job.expires_at.unwrap() - job.completed_at.unwrap();
        assert_eq!(retained, chrono::Duration::hours(72));
        assert_eq!(
            job.progress,
            Some(JobProgress {
                completed_parts: 1,
                total_parts: 1
            })
        );
        assert_eq!(backend.calls()[0].file_keys, ["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn structured_ref_is_kept_without_url() {
        let store = Arc::new(MemoryJobStore::new());
        let object_ref = ObjectRef::new("exports", "x.csv", "eu-west-1");
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(BackendOutput {
            object_ref: Some(object_ref.clone()),
            download_url: None,
        })]));
        let id = create(&store, &[]).await;

        dispatcher(store.clone(), backend, RecoveryRegistry::new(), DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.object_refs, [object_ref]);
        assert_eq!(job.access_urls, [String::new()]);
    }

    #[tokio::test]
    async fn multi_part_job_records_every_part() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![
            url_output("bundle-part-1.zip"),
            url_output("bundle-part-2.zip"),
        ]));
        let id = create(&store, &["a.pdf", "b.pdf", "c.pdf"]).await;
        let config = DispatchConfig {
            max_files_per_part: 2,
            ..Default::default()
        };

        let outcome = dispatcher(store.clone(), backend.clone(), RecoveryRegistry::new(), config)
            .dispatch(id)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { parts: 2 });
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.object_refs.len(), 2);
        assert_eq!(job.object_refs[1].key, "bundle-part-2.zip");
        let calls = backend.calls();
        assert_eq!(calls[1].part_number, Some(2));
        assert_eq!(calls[1].file_keys, ["c.pdf"]);
    }

    #[tokio::test]
    async fn backend_error_fails_job() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ComputeError::Backend(
            "corrupt input".into(),
        ))]));
        let id = create(&store, &["a.pdf"]).await;

        let outcome = dispatcher(store.clone(), backend, RecoveryRegistry::new(), DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        assert_matches!(outcome, DispatchOutcome::Failed { ref reason } if reason.starts_with(BACKEND_ERROR));
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("corrupt input"));
        assert!(job.object_refs.is_empty());
        assert!(job.expires_at.is_some());
    }

    #[tokio::test]
    async fn unparseable_url_without_ref_fails_job() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(BackendOutput {
            object_ref: None,
            download_url: Some("https://cdn.other.net/x.zip".into()),
        })]));
        let id = create(&store, &["a.pdf"]).await;

        let outcome = dispatcher(store.clone(), backend, RecoveryRegistry::new(), DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        assert_matches!(outcome, DispatchOutcome::Failed { .. });
        assert_eq!(store.get(id).await.unwrap().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend {
            script: Mutex::new(VecDeque::from([url_output("late.zip")])),
            delay: Some(Duration::from_secs(600)),
            ..Default::default()
        });
        let id = create(&store, &["a.pdf"]).await;

        let outcome = dispatcher(store.clone(), backend, RecoveryRegistry::new(), DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        assert_matches!(outcome, DispatchOutcome::Failed { ref reason } if reason.starts_with(BACKEND_TIMEOUT));
        let job = store.get(id).await.unwrap().unwrap();
        assert!(job.error_message.unwrap().starts_with("BackendTimeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_store_failure_on_completion_is_retried() {
        let inner = Arc::new(MemoryJobStore::new());
        let store = Arc::new(FlakyStore::new(inner.clone(), 1..3));
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("bundle.zip")]));
        let id = create(&inner, &["a.pdf"]).await;

        let outcome = JobDispatcher::new(
            store.clone(),
            backend,
            StorageUrlFormat::default(),
            RecoveryRegistry::new(),
            DispatchConfig::default(),
        )
        .dispatch(id)
        .await
        .unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { parts: 1 });
        assert_eq!(inner.get(id).await.unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(store.updates.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecorded_completion_is_failed_by_stall_sweep() {
        let inner = Arc::new(MemoryJobStore::new());
        let store = Arc::new(FlakyStore::new(inner.clone(), 1..usize::MAX));
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("bundle.zip")]));
        let id = create(&inner, &["a.pdf"]).await;
        let config = DispatchConfig::default();

        let result = JobDispatcher::new(
            store,
            backend.clone(),
            StorageUrlFormat::default(),
            RecoveryRegistry::new(),
            config.clone(),
        )
        .dispatch(id)
        .await;

        assert_matches!(result, Err(DispatchError::Store(StoreError::Unavailable(_))));
        assert_eq!(inner.get(id).await.unwrap().unwrap().status, JobStatus::Processing);

        let sweeper = dispatcher(inner.clone(), backend, RecoveryRegistry::new(), config.clone());
        assert_eq!(sweeper.fail_stalled(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + config.stall_threshold() + chrono::Duration::seconds(1);
        assert_eq!(sweeper.fail_stalled(later).await.unwrap(), 1);

        let job = inner.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().starts_with(BACKEND_TIMEOUT));
        assert_eq!(job.expires_at, Some(later + config.failed_retention));
    }

    #[tokio::test]
    async fn stall_sweep_ignores_pending_and_terminal_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("bundle.zip")]));
        let pending = create(&store, &["a.pdf"]).await;
        let done = create(&store, &["b.pdf"]).await;
        let dispatcher = dispatcher(
            store.clone(),
            backend,
            RecoveryRegistry::new(),
            DispatchConfig::default(),
        );
        dispatcher.dispatch(done).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(7);
        assert_eq!(dispatcher.fail_stalled(later).await.unwrap(), 0);
        assert_eq!(store.get(pending).await.unwrap().unwrap().status, JobStatus::Pending);
        assert_eq!(store.get(done).await.unwrap().unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn non_pending_job_is_skipped() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("a.zip"), url_output("b.zip")]));
        let id = create(&store, &["a.pdf"]).await;
        let dispatcher = dispatcher(
            store.clone(),
            backend.clone(),
            RecoveryRegistry::new(),
            DispatchConfig::default(),
        );

        dispatcher.dispatch(id).await.unwrap();
        let second = dispatcher.dispatch(id).await.unwrap();

        assert_eq!(
            second,
            DispatchOutcome::Skipped {
                status: JobStatus::Completed
            }
        );
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn docx_failure_is_retried_once_with_sanitized_copy() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        let docx = writer.finish().unwrap().into_inner();

        let objects = Arc::new(MemoryObjectStore::new());
        objects
            .put("uploads", "Plan.docx", docx, "application/octet-stream")
            .await
            .unwrap();
        let recovery = RecoveryRegistry::new().with(Arc::new(DocxSanitizeRecovery::new(
            objects.clone(),
            SanitizeMode::All,
        )));

        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(ComputeError::Backend("conversion failed".into())),
            url_output("bundle.zip"),
        ]));
        let id = create(&store, &["Plan.docx"]).await;

        let outcome = dispatcher(store.clone(), backend.clone(), recovery, DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { parts: 1 });
        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].file_keys, ["Plan.sanitized.docx"]);
        assert!(objects.contains("uploads", "Plan.sanitized.docx").await);
    }

    #[tokio::test]
    async fn failed_recovery_retry_fails_job() {
        let store = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let recovery = RecoveryRegistry::new().with(Arc::new(DocxSanitizeRecovery::new(
            objects,
            SanitizeMode::All,
        )));
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ComputeError::Backend(
            "conversion failed".into(),
        ))]));
        let id = create(&store, &["Missing.docx"]).await;

        let outcome = dispatcher(store.clone(), backend.clone(), recovery, DispatchConfig::default())
            .dispatch(id)
            .await
            .unwrap();

        assert_matches!(outcome, DispatchOutcome::Failed { .. });
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn spawned_dispatch_runs_in_background() {
        let store = Arc::new(MemoryJobStore::new());
        let backend = Arc::new(ScriptedBackend::new(vec![url_output("bundle.zip")]));
        let id = create(&store, &["a.pdf"]).await;
        let dispatcher = Arc::new(dispatcher(
            store.clone(),
            backend,
            RecoveryRegistry::new(),
            DispatchConfig::default(),
        ));

        dispatcher.spawn(id).await.unwrap();

        assert_eq!(store.get(id).await.unwrap().unwrap().status, JobStatus::Completed);
    }
}

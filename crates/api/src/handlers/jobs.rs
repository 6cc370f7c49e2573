//! Handlers for the `/jobs` resource.
//!
//! All endpoints require authentication via [`AuthActor`]. Callers only ever
//! see jobs they requested themselves, within their own team.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use parcel_core::error::CoreError;
use parcel_core::job::{Job, JobKind, JobParams, JobProgress, JobStatus, NewJob, TransformConfig};
use parcel_core::types::{JobId, Timestamp};
use parcel_db::{ListScope, VisibleAt};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthActor;
use crate::response::DataResponse;
use crate::state::AppState;

/// Default artifact expiration hint passed to the backend.
const DEFAULT_EXPIRATION_HOURS: u32 = 72;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub resource_id: String,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub source_bucket: Option<String>,
    #[serde(default)]
    pub source_objects: Vec<String>,
    #[serde(default)]
    pub folder_structure: Option<serde_json::Value>,
    #[serde(default)]
    pub transform_config: Option<TransformConfig>,
    #[serde(default)]
    pub output_name: Option<String>,
    #[serde(default)]
    pub expiration_hours: Option<u32>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// `false` when an existing job was returned for a repeated key.
    pub created: bool,
}

/// Client-facing projection of a job. Never carries backend error text.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub kind: JobKind,
    pub resource_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    pub part_count: usize,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            resource_id: job.resource_id.clone(),
            status: job.status,
            progress: job.progress,
            part_count: job.object_refs.len(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            expires_at: job.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub resource: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a live job and verify the caller requested it.
///
/// Unknown and expired jobs are `NotFound`; jobs of another actor or team
/// are `Forbidden`.
async fn find_and_authorize(state: &AppState, job_id: JobId, auth: &AuthActor) -> AppResult<Job> {
    let not_found = || {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })
    };

    let job = state.store.get(job_id).await?.ok_or_else(not_found)?;
    if job.is_expired(Utc::now()) {
        return Err(not_found());
    }

    if job.team_id != auth.team_id || !job.is_owned_by(&auth.actor) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "{} cannot access job {job_id}",
            auth.actor.label()
        ))));
    }

    Ok(job)
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create (or reuse, by idempotency key) a job and dispatch it in the
/// background. Returns 202 immediately; only newly created jobs are
/// dispatched.
pub async fn create_job(
    auth: AuthActor,
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let header_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let output_name = input
        .output_name
        .unwrap_or_else(|| format!("{}-export", input.resource_id));

    let new = NewJob {
        kind: input.kind.unwrap_or(JobKind::DocumentBundle),
        resource_id: input.resource_id,
        team_id: auth.team_id.clone(),
        actor: auth.actor.clone(),
        params: JobParams {
            source_bucket: input
                .source_bucket
                .unwrap_or_else(|| state.config.default_source_bucket.clone()),
            source_objects: input.source_objects,
            folder_structure: input
                .folder_structure
                .unwrap_or_else(|| serde_json::json!({})),
            transform: input.transform_config,
            output_name,
            expiration_hours: input.expiration_hours.unwrap_or(DEFAULT_EXPIRATION_HOURS),
        },
        idempotency_key: input.idempotency_key.or(header_key),
    };

    let errors = new.validate();
    if !errors.is_empty() {
        return Err(AppError::Core(CoreError::Validation(errors.join("; "))));
    }

    let outcome = state.store.create(new).await?;
    let job = outcome.job;

    if outcome.created {
        state.dispatcher.spawn(job.id);
        tracing::info!(
            job_id = %job.id,
            kind = job.kind.as_str(),
            resource_id = %job.resource_id,
            actor = %auth.actor.label(),
            "Job created",
        );
    } else {
        tracing::info!(job_id = %job.id, status = %job.status, "Idempotent create returned existing job");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: CreateJobResponse {
                job_id: job.id,
                status: job.status,
                created: outcome.created,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs?resource=..&limit=..
///
/// The caller's jobs for a resource, newest first, filtered by visibility.
pub async fn list_jobs(
    auth: AuthActor,
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> AppResult<impl IntoResponse> {
    if params.resource.trim().is_empty() {
        return Err(AppError::BadRequest("resource is required".into()));
    }

    let now = Utc::now();
    let scope = ListScope {
        team_id: auth.team_id.clone(),
        actor: Some(auth.actor.clone()),
        visible: Some(VisibleAt {
            rules: state.visibility,
            now,
        }),
    };
    let jobs = state
        .store
        .list_by_resource(&params.resource, &scope, params.limit)
        .await?;

    let views: Vec<JobView> = state
        .visibility
        .filter(jobs, &auth.actor, now)
        .iter()
        .map(JobView::from)
        .collect();

    Ok(Json(DataResponse { data: views }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthActor,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth).await?;
    Ok(Json(DataResponse {
        data: JobView::from(&job),
    }))
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/parts/{index}
///
/// Redirects (302) to a freshly minted URL for one part, falling back to
/// the URL stored at completion when minting fails.
pub async fn get_part(
    auth: AuthActor,
    State(state): State<AppState>,
    Path((job_id, index)): Path<(JobId, usize)>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth).await?;

    if job.status != JobStatus::Completed {
        return Err(AppError::BadRequest(format!(
            "Job {job_id} is {}, parts are available once it completes",
            job.status
        )));
    }
    let Some(object) = job.object_refs.get(index) else {
        return Err(AppError::BadRequest(format!(
            "Part index {index} out of range (job has {} parts)",
            job.object_refs.len()
        )));
    };

    let stored = job
        .access_urls
        .get(index)
        .map(String::as_str)
        .filter(|url| !url.is_empty());

    let resolved = state
        .access
        .resolve(&job.team_id, Some(object), stored)
        .await
        .map_err(|e| AppError::InternalError(format!("No URL available for part: {e}")))?;

    if resolved.is_minted() {
        replace_stored_url(&state, job_id, index, resolved.url().to_string()).await;
    }

    Ok((StatusCode::FOUND, [(LOCATION, resolved.url().to_string())]))
}

/// Best-effort write-back of a freshly minted URL; status is left untouched.
async fn replace_stored_url(state: &AppState, job_id: JobId, index: usize, url: String) {
    let result = state
        .store
        .update(
            job_id,
            Box::new(move |job: &mut Job| {
                if job.access_urls.len() == job.object_refs.len() && index < job.access_urls.len() {
                    job.access_urls[index] = url;
                }
                Ok(())
            }),
        )
        .await;

    if let Err(e) = result {
        tracing::warn!(job_id = %job_id, index, error = %e, "Failed to store refreshed URL");
    }
}

//! Handlers for `/internal/*`, callable only with the static service secret.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use parcel_core::error::CoreError;
use parcel_core::job::JobStatus;
use parcel_core::notification::{Correlation, NotificationEvent};
use parcel_core::types::{JobId, Timestamp};
use parcel_events::ScheduleOutcome;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::ServiceCaller;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// GET /api/v1/internal/jobs/{id}
///
/// The full record, including backend error text. Expired jobs still in
/// the store are returned as-is.
pub async fn get_job(
    _caller: ServiceCaller,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get(job_id).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })
    })?;
    Ok(Json(DataResponse { data: job }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub job_id: JobId,
    pub dispatched: bool,
}

/// POST /api/v1/internal/jobs/{id}/dispatch
///
/// Re-kick a job stuck in PENDING (e.g. after a restart).
pub async fn dispatch_job(
    _caller: ServiceCaller,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.store.get(job_id).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })
    })?;

    if job.status != JobStatus::Pending {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} is {}, only PENDING jobs can be dispatched",
            job.status
        ))));
    }

    state.dispatcher.spawn(job_id);
    tracing::info!(job_id = %job_id, "Job re-dispatched");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: DispatchResponse {
                job_id,
                dispatched: true,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Notification events
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventRequest {
    pub team_id: String,
    pub resource_id: String,
    pub channel: String,
    /// Acting principal, e.g. the viewer's email.
    pub actor: String,
    pub event_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub occurred_at: Option<Timestamp>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEventResponse {
    pub event_id: uuid::Uuid,
    /// `"scheduled"` or `"collapsed"`.
    pub trigger: &'static str,
}

/// POST /api/v1/internal/notifications/events
///
/// Record a qualifying event and push its correlation's notification out
/// by one debounce window.
pub async fn record_event(
    _caller: ServiceCaller,
    State(state): State<AppState>,
    payload: Result<Json<RecordEventRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if input.event_type.trim().is_empty() || input.subject_id.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "eventType and subjectId are required".into(),
        )));
    }

    let event = NotificationEvent {
        id: uuid::Uuid::new_v4(),
        team_id: input.team_id,
        correlation: Correlation::new(input.resource_id, input.channel, input.actor),
        event_type: input.event_type,
        subject_id: input.subject_id,
        payload: input.payload,
        occurred_at: input.occurred_at.unwrap_or_else(Utc::now),
    };
    let event_id = event.id;

    let trigger = match state.debouncer.record(event).await? {
        ScheduleOutcome::Scheduled { .. } => "scheduled",
        ScheduleOutcome::Collapsed => "collapsed",
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: RecordEventResponse { event_id, trigger },
        }),
    ))
}

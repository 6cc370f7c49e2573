//! Row mapping for the `jobs` table.
//!
//! The domain [`Job`] keeps the actor as a tagged enum and the parameters as
//! a struct; the table flattens the actor into three nullable columns and
//! stores parameters, references and URLs as JSONB.

use parcel_core::error::CoreError;
use parcel_core::job::{Actor, Job, JobKind, JobParams, JobProgress, JobStatus, StatusId};
use parcel_core::object_ref::ObjectRef;
use parcel_core::types::{JobId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub kind: String,
    pub resource_id: String,
    pub team_id: String,
    pub requester_id: Option<String>,
    pub link_id: Option<String>,
    pub viewer_email: Option<String>,
    pub status_id: StatusId,
    pub params: Json<JobParams>,
    pub object_refs: Json<Vec<ObjectRef>>,
    pub access_urls: Json<Vec<String>>,
    pub completed_parts: Option<i32>,
    pub total_parts: Option<i32>,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

/// Actor columns as stored: exactly one of `requester_id` or
/// `(link_id, viewer_email)` is populated.
pub struct ActorColumns<'a> {
    pub requester_id: Option<&'a str>,
    pub link_id: Option<&'a str>,
    pub viewer_email: Option<&'a str>,
}

impl<'a> ActorColumns<'a> {
    pub fn from_actor(actor: &'a Actor) -> Self {
        match actor {
            Actor::User { user_id } => Self {
                requester_id: Some(user_id),
                link_id: None,
                viewer_email: None,
            },
            Actor::Visitor {
                link_id,
                viewer_email,
            } => Self {
                requester_id: None,
                link_id: Some(link_id),
                viewer_email: Some(viewer_email),
            },
        }
    }
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!("job {} has unknown status_id {}", row.id, row.status_id))
        })?;
        let kind = JobKind::from_name(&row.kind)?;

        let actor = match (row.requester_id, row.link_id, row.viewer_email) {
            (Some(user_id), None, None) => Actor::User { user_id },
            (None, Some(link_id), Some(viewer_email)) => Actor::Visitor {
                link_id,
                viewer_email,
            },
            _ => {
                return Err(CoreError::Internal(format!(
                    "job {} has an inconsistent actor",
                    row.id
                )))
            }
        };

        let progress = match (row.completed_parts, row.total_parts) {
            (Some(done), Some(total)) => Some(JobProgress {
                completed_parts: u32::try_from(done).unwrap_or(0),
                total_parts: u32::try_from(total).unwrap_or(0),
            }),
            _ => None,
        };

        Ok(Job {
            id: row.id,
            kind,
            resource_id: row.resource_id,
            team_id: row.team_id,
            actor,
            status,
            params: row.params.0,
            object_refs: row.object_refs.0,
            access_urls: row.access_urls.0,
            progress,
            idempotency_key: row.idempotency_key,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            expires_at: row.expires_at,
        })
    }
}

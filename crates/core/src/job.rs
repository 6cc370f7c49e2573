//! Export job model: status lifecycle, actor identity, parameters.
//!
//! A [`Job`] is the unit of asynchronous artifact production. Its status
//! only ever moves forward along `PENDING -> PROCESSING -> {COMPLETED,
//! FAILED}`; [`Job::validate_mutation`] is the single place that rule is
//! enforced, and every store implementation runs it inside its atomic
//! update.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::object_ref::ObjectRef;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default access-URL lifetime requested from the backend (3 days).
pub const DEFAULT_EXPIRATION_HOURS: u32 = 72;

/// Upper bound on the access-URL lifetime (SigV4 presigning limit, 7 days).
pub const MAX_EXPIRATION_HOURS: u32 = 168;

/// Maximum number of source objects accepted in a single job.
pub const MAX_SOURCE_OBJECTS: usize = 10_000;

/// Maximum length for scope identifiers and idempotency keys.
pub const MAX_IDENTIFIER_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status ID type matching the SMALLINT `status_id` column.
pub type StatusId = i16;

/// Job lifecycle status.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Parse from the database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Processing),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// `true` for COMPLETED and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What the compute backend is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Zipped bundle of documents, optionally watermarked.
    DocumentBundle,
    /// CSV export of access-log (visit) events.
    VisitExport,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentBundle => "document_bundle",
            Self::VisitExport => "visit_export",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "document_bundle" => Ok(Self::DocumentBundle),
            "visit_export" => Ok(Self::VisitExport),
            other => Err(CoreError::Validation(format!(
                "Unknown job kind '{other}'. Must be one of: document_bundle, visit_export"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Who requested a job. Internal users and link visitors are mutually
/// exclusive identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Actor {
    #[serde(rename_all = "camelCase")]
    User { user_id: String },
    #[serde(rename_all = "camelCase")]
    Visitor {
        link_id: String,
        viewer_email: String,
    },
}

impl Actor {
    /// Whether two actor identities refer to the same principal.
    ///
    /// Viewer emails compare case-insensitively.
    pub fn same_as(&self, other: &Actor) -> bool {
        match (self, other) {
            (Actor::User { user_id: a }, Actor::User { user_id: b }) => a == b,
            (
                Actor::Visitor {
                    link_id: la,
                    viewer_email: ea,
                },
                Actor::Visitor {
                    link_id: lb,
                    viewer_email: eb,
                },
            ) => la == lb && ea.eq_ignore_ascii_case(eb),
            _ => false,
        }
    }

    /// Stable label used in log fields and correlation tags.
    pub fn label(&self) -> String {
        match self {
            Actor::User { user_id } => format!("user:{user_id}"),
            Actor::Visitor {
                link_id,
                viewer_email,
            } => format!("visitor:{link_id}:{}", viewer_email.to_ascii_lowercase()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Optional transforms applied by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    /// Watermark settings, passed through to the backend verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<serde_json::Value>,
}

/// Backend-facing job parameters, stored with the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub source_bucket: String,
    pub source_objects: Vec<String>,
    #[serde(default)]
    pub folder_structure: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformConfig>,
    pub output_name: String,
    pub expiration_hours: u32,
}

/// Per-part progress of a PROCESSING job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub completed_parts: u32,
    pub total_parts: u32,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Input for creating a job. The store assigns id, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub resource_id: String,
    pub team_id: String,
    pub actor: Actor,
    pub params: JobParams,
    pub idempotency_key: Option<String>,
}

impl NewJob {
    /// Validate the request. Returns a list of human-readable errors; an
    /// empty list means the job may be created.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.resource_id.trim().is_empty() {
            errors.push("resourceId is required".to_string());
        }
        if self.team_id.trim().is_empty() {
            errors.push("teamId is required".to_string());
        }
        if self.resource_id.len() > MAX_IDENTIFIER_LEN {
            errors.push(format!(
                "resourceId must be at most {MAX_IDENTIFIER_LEN} characters"
            ));
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() || key.len() > MAX_IDENTIFIER_LEN {
                errors.push(format!(
                    "idempotencyKey must be 1-{MAX_IDENTIFIER_LEN} characters"
                ));
            }
        }
        if self.params.source_bucket.trim().is_empty() {
            errors.push("sourceBucket is required".to_string());
        }
        if self.kind == JobKind::DocumentBundle && self.params.source_objects.is_empty() {
            errors.push("sourceObjects must not be empty".to_string());
        }
        if self.params.source_objects.len() > MAX_SOURCE_OBJECTS {
            errors.push(format!(
                "sourceObjects exceeds the limit of {MAX_SOURCE_OBJECTS}"
            ));
        }
        if self
            .params
            .source_objects
            .iter()
            .any(|key| key.trim().is_empty())
        {
            errors.push("sourceObjects must not contain empty keys".to_string());
        }
        if self.params.output_name.trim().is_empty() {
            errors.push("outputName is required".to_string());
        }
        if self.params.expiration_hours == 0
            || self.params.expiration_hours > MAX_EXPIRATION_HOURS
        {
            errors.push(format!(
                "expirationHours must be between 1 and {MAX_EXPIRATION_HOURS}"
            ));
        }

        errors
    }
}

/// Tracked unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub resource_id: String,
    pub team_id: String,
    pub actor: Actor,
    pub status: JobStatus,
    pub params: JobParams,
    pub object_refs: Vec<ObjectRef>,
    pub access_urls: Vec<String>,
    pub progress: Option<JobProgress>,
    pub idempotency_key: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

impl Job {
    /// Materialize a new PENDING job.
    pub fn from_new(new: NewJob, id: JobId, now: Timestamp) -> Self {
        Self {
            id,
            kind: new.kind,
            resource_id: new.resource_id,
            team_id: new.team_id,
            actor: new.actor,
            status: JobStatus::Pending,
            params: new.params,
            object_refs: Vec::new(),
            access_urls: Vec::new(),
            progress: None,
            idempotency_key: new.idempotency_key,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: None,
        }
    }

    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        self.actor.same_as(actor)
    }

    /// Whether the job's retention has lapsed at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Move to `next`, rejecting anything but a forward step.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Check that `after` is a legal successor of `before`.
    ///
    /// Identity and ownership are immutable, status moves forward or stays,
    /// and access URLs stay index-aligned with object references.
    pub fn validate_mutation(before: &Job, after: &Job) -> Result<(), CoreError> {
        if before.id != after.id
            || before.team_id != after.team_id
            || before.resource_id != after.resource_id
            || before.actor != after.actor
        {
            return Err(CoreError::Validation(
                "Job identity and ownership are immutable".into(),
            ));
        }

        if before.status != after.status && !before.status.can_transition_to(after.status) {
            return Err(CoreError::InvalidTransition {
                from: before.status,
                to: after.status,
            });
        }

        if !after.object_refs.is_empty()
            && !after.access_urls.is_empty()
            && after.object_refs.len() != after.access_urls.len()
        {
            return Err(CoreError::Validation(format!(
                "accessUrls ({}) must align with objectRefs ({})",
                after.access_urls.len(),
                after.object_refs.len()
            )));
        }

        if after.error_message.is_some() && after.status != JobStatus::Failed {
            return Err(CoreError::Validation(
                "errorMessage may only be set on FAILED jobs".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

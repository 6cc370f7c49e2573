//! The job storage contract.
//!
//! Every implementation must serialize concurrent [`JobStore::update`] calls
//! for the same job id: two dispatch attempts can never both observe
//! `PENDING` and both move the job to `PROCESSING`.

use async_trait::async_trait;
use parcel_core::error::CoreError;
use parcel_core::job::{Actor, Job, NewJob};
use parcel_core::types::{JobId, Timestamp};
use parcel_core::visibility::VisibilityRules;

/// Maximum page size for resource listings.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for resource listings.
pub const DEFAULT_LIMIT: i64 = 50;

/// Clamp a caller-supplied listing limit into `1..=MAX_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Read-modify-write closure applied under the store's per-job lock.
///
/// Returning an error aborts the update and leaves the record untouched.
pub type JobMutator<'a> = Box<dyn FnOnce(&mut Job) -> Result<(), CoreError> + Send + 'a>;

/// Result of [`JobStore::create`].
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub job: Job,
    /// `false` when an existing job was returned for a repeated idempotency key.
    pub created: bool,
}

/// Owning scope for listings.
#[derive(Debug, Clone)]
pub struct ListScope {
    pub team_id: String,
    /// Restrict to jobs requested by this actor when set.
    pub actor: Option<Actor>,
    /// Drop jobs hidden by these rules before the page limit is applied.
    pub visible: Option<VisibleAt>,
}

/// Listing visibility evaluated at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct VisibleAt {
    pub rules: VisibilityRules,
    pub now: Timestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The mutator or the store's own invariant checks rejected the change.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Job store error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Database(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Durable, TTL-bearing storage of [`Job`] records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new PENDING job, or return the existing job when the same
    /// actor repeats an idempotency key within the team.
    async fn create(&self, new: NewJob) -> Result<CreateOutcome, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Most-recent-first jobs for a resource within `scope`.
    ///
    /// `scope.visible` filters before `limit`, so a page is never crowded
    /// out by jobs the caller would hide.
    async fn list_by_resource(
        &self,
        resource_id: &str,
        scope: &ListScope,
        limit: Option<i64>,
    ) -> Result<Vec<Job>, StoreError>;

    /// Atomically apply `mutator` to the job and persist the result.
    ///
    /// The mutated job must pass [`Job::validate_mutation`]; `updated_at`
    /// is stamped by the store.
    async fn update(&self, id: JobId, mutator: JobMutator<'_>) -> Result<Job, StoreError>;

    /// PROCESSING jobs last updated before `updated_before`, oldest first.
    async fn list_stalled(
        &self,
        updated_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;

    /// Remove terminal jobs whose retention lapsed at or before `now`.
    async fn evict_expired(&self, now: Timestamp) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_defaults_and_bounds() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn pool_timeout_is_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn only_backend_failures_are_transient() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Database("deadlock".into()).is_transient());
        assert!(!StoreError::NotFound(uuid::Uuid::now_v7()).is_transient());
        assert!(!StoreError::Rejected(CoreError::Validation("bad".into())).is_transient());
    }
}

//! Postgres-backed [`JobStore`].
//!
//! Updates run as `SELECT ... FOR UPDATE` + mutate + `UPDATE` inside one
//! transaction, so concurrent updates to the same job serialize on the row
//! lock and each mutator sees the previous one's result.

use async_trait::async_trait;
use chrono::Utc;
use parcel_core::job::{Job, NewJob};
use parcel_core::types::{JobId, Timestamp};

use crate::models::job::JobRow;
use crate::repositories::JobRepo;
use crate::store::{clamp_limit, CreateOutcome, JobMutator, JobStore, ListScope, StoreError};
use crate::DbPool;

#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn to_job(row: JobRow) -> Result<Job, StoreError> {
    Job::try_from(row).map_err(|e| StoreError::Database(e.to_string()))
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> Result<CreateOutcome, StoreError> {
        let job = Job::from_new(new, uuid::Uuid::now_v7(), Utc::now());

        if let Some(row) = JobRepo::insert(&self.pool, &job).await? {
            return Ok(CreateOutcome {
                job: to_job(row)?,
                created: true,
            });
        }

        // The insert only yields nothing on an idempotency-key conflict.
        let key = job.idempotency_key.as_deref().unwrap_or_default();
        let existing = JobRepo::find_by_idempotency_key(&self.pool, &job.team_id, &job.actor, key)
            .await?
            .ok_or_else(|| {
                StoreError::Database(format!(
                    "idempotency conflict for team {} but no existing job found",
                    job.team_id
                ))
            })?;

        tracing::debug!(job_id = %existing.id, team_id = %job.team_id, "Idempotent create returned existing job");
        Ok(CreateOutcome {
            job: to_job(existing)?,
            created: false,
        })
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await?
            .map(to_job)
            .transpose()
    }

    async fn list_by_resource(
        &self,
        resource_id: &str,
        scope: &ListScope,
        limit: Option<i64>,
    ) -> Result<Vec<Job>, StoreError> {
        JobRepo::list_by_resource(
            &self.pool,
            resource_id,
            &scope.team_id,
            scope.actor.as_ref(),
            scope.visible.as_ref(),
            clamp_limit(limit),
        )
        .await?
        .into_iter()
        .map(to_job)
        .collect()
    }

    async fn update(&self, id: JobId, mutator: JobMutator<'_>) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = JobRepo::lock_by_id(&mut *tx, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        let before = to_job(row)?;
        let mut after = before.clone();

        // Dropping `tx` on the error paths rolls back and releases the lock.
        mutator(&mut after)?;
        Job::validate_mutation(&before, &after)?;
        after.updated_at = Utc::now();

        JobRepo::save(&mut *tx, &after).await?;
        tx.commit().await?;
        Ok(after)
    }

    async fn list_stalled(
        &self,
        updated_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        JobRepo::list_stalled(&self.pool, updated_before, limit)
            .await?
            .into_iter()
            .map(to_job)
            .collect()
    }

    async fn evict_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        Ok(JobRepo::delete_expired(&self.pool, now).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

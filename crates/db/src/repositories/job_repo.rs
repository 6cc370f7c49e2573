//! Repository for the `jobs` table.

use parcel_core::job::{Actor, Job, JobStatus, StatusId};
use parcel_core::types::{JobId, Timestamp};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::job::{ActorColumns, JobRow};
use crate::store::VisibleAt;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, kind, resource_id, team_id, requester_id, link_id, viewer_email, \
    status_id, params, object_refs, access_urls, completed_parts, total_parts, \
    idempotency_key, error_message, created_at, updated_at, completed_at, expires_at";

/// Terminal statuses eligible for retention eviction.
const TERMINAL_STATUSES: [StatusId; 2] = [
    JobStatus::Completed as StatusId,
    JobStatus::Failed as StatusId,
];

/// Statuses listed regardless of age.
const LIVE_STATUSES: [StatusId; 2] = [
    JobStatus::Pending as StatusId,
    JobStatus::Processing as StatusId,
];

/// Provides persistence operations for export jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job.
    ///
    /// Returns `None` when the actor already used `idempotency_key` in this
    /// team; the caller then reads the existing row with
    /// [`Self::find_by_idempotency_key`].
    pub async fn insert(pool: &PgPool, job: &Job) -> Result<Option<JobRow>, sqlx::Error> {
        let actor = ActorColumns::from_actor(&job.actor);
        let query = format!(
            "INSERT INTO jobs (id, kind, resource_id, team_id, requester_id, link_id, \
                 viewer_email, status_id, params, object_refs, access_urls, \
                 idempotency_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (team_id, idempotency_key, (COALESCE(requester_id, '')), \
                 (COALESCE(link_id, '')), (lower(COALESCE(viewer_email, '')))) \
             WHERE idempotency_key IS NOT NULL \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job.id)
            .bind(job.kind.as_str())
            .bind(&job.resource_id)
            .bind(&job.team_id)
            .bind(actor.requester_id)
            .bind(actor.link_id)
            .bind(actor.viewer_email)
            .bind(job.status.id())
            .bind(Json(&job.params))
            .bind(Json(&job.object_refs))
            .bind(Json(&job.access_urls))
            .bind(&job.idempotency_key)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by ID.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the job `actor` created in `team_id` under `idempotency_key`.
    pub async fn find_by_idempotency_key(
        pool: &PgPool,
        team_id: &str,
        actor: &Actor,
        idempotency_key: &str,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let cols = ActorColumns::from_actor(actor);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE team_id = $1 AND idempotency_key = $2 \
               AND COALESCE(requester_id, '') = COALESCE($3::TEXT, '') \
               AND COALESCE(link_id, '') = COALESCE($4::TEXT, '') \
               AND lower(COALESCE(viewer_email, '')) = lower(COALESCE($5::TEXT, ''))"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(team_id)
            .bind(idempotency_key)
            .bind(cols.requester_id)
            .bind(cols.link_id)
            .bind(cols.viewer_email)
            .fetch_optional(pool)
            .await
    }

    /// Read a job and hold its row lock until the transaction ends.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: JobId,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Persist every mutable column of `job`.
    pub async fn save(conn: &mut PgConnection, job: &Job) -> Result<(), sqlx::Error> {
        let (completed_parts, total_parts) = match job.progress {
            Some(p) => (
                Some(i32::try_from(p.completed_parts).unwrap_or(i32::MAX)),
                Some(i32::try_from(p.total_parts).unwrap_or(i32::MAX)),
            ),
            None => (None, None),
        };
        sqlx::query(
            "UPDATE jobs SET \
                 status_id = $2, params = $3, object_refs = $4, access_urls = $5, \
                 completed_parts = $6, total_parts = $7, error_message = $8, \
                 updated_at = $9, completed_at = $10, expires_at = $11 \
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(job.status.id())
        .bind(Json(&job.params))
        .bind(Json(&job.object_refs))
        .bind(Json(&job.access_urls))
        .bind(completed_parts)
        .bind(total_parts)
        .bind(&job.error_message)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.expires_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// List jobs for a resource within a team, newest first.
    ///
    /// When `actor` is set only that principal's jobs are returned. When
    /// `visible` is set, hidden COMPLETED and FAILED jobs are filtered in the
    /// query so they never count against `limit`.
    pub async fn list_by_resource(
        pool: &PgPool,
        resource_id: &str,
        team_id: &str,
        actor: Option<&Actor>,
        visible: Option<&VisibleAt>,
        limit: i64,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let cols = actor.map(ActorColumns::from_actor);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE resource_id = $1 AND team_id = $2 \
               AND ($3::TEXT IS NULL OR requester_id = $3) \
               AND ($4::TEXT IS NULL OR link_id = $4) \
               AND ($5::TEXT IS NULL OR lower(viewer_email) = lower($5)) \
               AND ($7::TIMESTAMPTZ IS NULL \
                    OR status_id = ANY($9) \
                    OR (status_id = $10 AND expires_at > $7) \
                    OR (status_id = $11 AND created_at > $8)) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $6"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(resource_id)
            .bind(team_id)
            .bind(cols.as_ref().and_then(|c| c.requester_id))
            .bind(cols.as_ref().and_then(|c| c.link_id))
            .bind(cols.as_ref().and_then(|c| c.viewer_email))
            .bind(limit)
            .bind(visible.map(|v| v.now))
            .bind(visible.map(|v| v.rules.failed_since(v.now)))
            .bind(&LIVE_STATUSES[..])
            .bind(JobStatus::Completed.id())
            .bind(JobStatus::Failed.id())
            .fetch_all(pool)
            .await
    }

    /// PROCESSING jobs whose `updated_at` is before `updated_before`, oldest first.
    pub async fn list_stalled(
        pool: &PgPool,
        updated_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status_id = $1 AND updated_at < $2 \
             ORDER BY updated_at \
             LIMIT $3"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Processing.id())
            .bind(updated_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete terminal jobs whose `expires_at` is at or before `now`.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs \
             WHERE expires_at IS NOT NULL AND expires_at <= $1 AND status_id = ANY($2)",
        )
        .bind(now)
        .bind(&TERMINAL_STATUSES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

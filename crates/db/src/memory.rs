//! In-process [`JobStore`] for tests and single-node local runs.
//!
//! A single write lock guards the whole map, which makes every `update` a
//! serialized read-modify-write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parcel_core::job::{Job, JobStatus, NewJob};
use parcel_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

use crate::store::{clamp_limit, CreateOutcome, JobMutator, JobStore, ListScope, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed job, bypassing creation rules. Test fixture helper.
    pub async fn insert_raw(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<CreateOutcome, StoreError> {
        let mut jobs = self.jobs.write().await;

        if let Some(key) = new.idempotency_key.as_deref() {
            let existing = jobs
                .values()
                .find(|j| {
                    j.team_id == new.team_id
                        && j.is_owned_by(&new.actor)
                        && j.idempotency_key.as_deref() == Some(key)
                });
            if let Some(job) = existing {
                return Ok(CreateOutcome {
                    job: job.clone(),
                    created: false,
                });
            }
        }

        let job = Job::from_new(new, uuid::Uuid::now_v7(), Utc::now());
        jobs.insert(job.id, job.clone());
        Ok(CreateOutcome { job, created: true })
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_by_resource(
        &self,
        resource_id: &str,
        scope: &ListScope,
        limit: Option<i64>,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.resource_id == resource_id && j.team_id == scope.team_id)
            .filter(|j| scope.actor.as_ref().is_none_or(|a| j.is_owned_by(a)))
            .filter(|j| scope.visible.is_none_or(|v| v.rules.admits(j, v.now)))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matching.truncate(clamp_limit(limit) as usize);
        Ok(matching)
    }

    async fn update(&self, id: JobId, mutator: JobMutator<'_>) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let current = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        let mut after = current.clone();
        mutator(&mut after)?;
        Job::validate_mutation(current, &after)?;
        after.updated_at = Utc::now();

        *current = after.clone();
        Ok(after)
    }

    async fn list_stalled(
        &self,
        updated_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut stalled: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing && j.updated_at < updated_before)
            .cloned()
            .collect();

        stalled.sort_by_key(|j| j.updated_at);
        stalled.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(stalled)
    }

    async fn evict_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| !(j.status.is_terminal() && j.is_expired(now)));
        Ok((before - jobs.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Duration;
    use parcel_core::error::CoreError;
    use parcel_core::job::{Actor, JobKind, JobParams};
    use parcel_core::object_ref::ObjectRef;
    use parcel_core::visibility::VisibilityRules;

    use super::*;
    use crate::store::VisibleAt;

    fn user(id: &str) -> Actor {
        Actor::User {
            user_id: id.to_string(),
        }
    }

    fn new_job(actor: Actor, key: Option<&str>) -> NewJob {
        NewJob {
            kind: JobKind::DocumentBundle,
            resource_id: "dr_1".into(),
            team_id: "t_1".into(),
            actor,
            params: JobParams {
                source_bucket: "uploads".into(),
                source_objects: vec!["a.pdf".into()],
                folder_structure: serde_json::Value::Null,
                transform: None,
                output_name: "bundle".into(),
                expiration_hours: 72,
            },
            idempotency_key: key.map(str::to_string),
        }
    }

    fn claim(job: &mut Job) -> Result<(), CoreError> {
        job.transition(JobStatus::Processing)
    }

    #[tokio::test]
    async fn create_starts_pending() {
        let store = MemoryJobStore::new();
        let out = store.create(new_job(user("u_1"), None)).await.unwrap();
        assert!(out.created);
        assert_eq!(out.job.status, JobStatus::Pending);
        assert!(out.job.object_refs.is_empty());
        assert_eq!(store.get(out.job.id).await.unwrap(), Some(out.job));
    }

    #[tokio::test]
    async fn repeated_idempotency_key_returns_existing_job() {
        let store = MemoryJobStore::new();
        let first = store.create(new_job(user("u_1"), Some("k1"))).await.unwrap();
        let second = store.create(new_job(user("u_1"), Some("k1"))).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job.id, second.job.id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn idempotency_key_is_scoped_per_actor() {
        let store = MemoryJobStore::new();
        let first = store.create(new_job(user("u_1"), Some("k1"))).await.unwrap();
        let other = store.create(new_job(user("u_2"), Some("k1"))).await.unwrap();

        assert!(other.created);
        assert_ne!(other.job.id, first.job.id);
        assert!(other.job.is_owned_by(&user("u_2")));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let id = store.create(new_job(user("u_1"), None)).await.unwrap().job.id;

        let attempts = (0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.update(id, Box::new(claim)).await })
        });
        let results = futures::future::join_all(attempts).await;

        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_record_untouched() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job(user("u_1"), None)).await.unwrap().job;

        let err = store
            .update(
                job.id,
                Box::new(|j: &mut Job| {
                    j.object_refs = vec![ObjectRef::new("b", "k", "us-east-1")];
                    j.access_urls = vec!["a".into(), "b".into()];
                    Ok(())
                }),
            )
            .await
            .unwrap_err();

        assert_matches!(err, StoreError::Rejected(CoreError::Validation(_)));
        assert_eq!(store.get(job.id).await.unwrap().unwrap(), job);
    }

    #[tokio::test]
    async fn backward_transition_is_rejected() {
        let store = MemoryJobStore::new();
        let id = store.create(new_job(user("u_1"), None)).await.unwrap().job.id;
        store.update(id, Box::new(claim)).await.unwrap();

        let err = store
            .update(
                id,
                Box::new(|j: &mut Job| {
                    j.status = JobStatus::Pending;
                    Ok(())
                }),
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Rejected(CoreError::InvalidTransition { .. })
        );
    }

    #[tokio::test]
    async fn update_missing_job_is_not_found() {
        let store = MemoryJobStore::new();
        let id = uuid::Uuid::now_v7();
        assert_matches!(
            store.update(id, Box::new(claim)).await,
            Err(StoreError::NotFound(missing)) if missing == id
        );
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_scoped() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        for (i, owner) in ["u_1", "u_2", "u_1"].iter().enumerate() {
            let mut job = Job::from_new(new_job(user(owner), None), uuid::Uuid::now_v7(), now);
            job.created_at = now + Duration::seconds(i as i64);
            store.insert_raw(job).await;
        }

        let scope = ListScope {
            team_id: "t_1".into(),
            actor: Some(user("u_1")),
            visible: None,
        };
        let jobs = store.list_by_resource("dr_1", &scope, None).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].created_at > jobs[1].created_at);

        let other_team = ListScope {
            team_id: "t_2".into(),
            actor: None,
            visible: None,
        };
        assert!(store
            .list_by_resource("dr_1", &other_team, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn hidden_jobs_do_not_consume_the_page() {
        let store = MemoryJobStore::new();
        let now = Utc::now();

        let mut pending = Job::from_new(new_job(user("u_1"), None), uuid::Uuid::now_v7(), now);
        pending.created_at = now - Duration::days(3);
        store.insert_raw(pending.clone()).await;

        for _ in 0..5 {
            let mut failed = Job::from_new(new_job(user("u_1"), None), uuid::Uuid::now_v7(), now);
            failed.status = JobStatus::Failed;
            failed.created_at = now - Duration::hours(2);
            store.insert_raw(failed).await;
        }

        let scope = ListScope {
            team_id: "t_1".into(),
            actor: Some(user("u_1")),
            visible: Some(VisibleAt {
                rules: VisibilityRules::default(),
                now,
            }),
        };
        let jobs = store.list_by_resource("dr_1", &scope, Some(2)).await.unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), [pending.id]);
    }

    #[tokio::test]
    async fn stalled_listing_returns_old_processing_jobs_only() {
        let store = MemoryJobStore::new();
        let now = Utc::now();

        let mut stuck = Job::from_new(new_job(user("u_1"), None), uuid::Uuid::now_v7(), now);
        stuck.status = JobStatus::Processing;
        stuck.updated_at = now - Duration::hours(1);

        let mut active = stuck.clone();
        active.id = uuid::Uuid::now_v7();
        active.updated_at = now;

        let mut old_pending = stuck.clone();
        old_pending.id = uuid::Uuid::now_v7();
        old_pending.status = JobStatus::Pending;

        store.insert_raw(stuck.clone()).await;
        store.insert_raw(active).await;
        store.insert_raw(old_pending).await;

        let stalled = store
            .list_stalled(now - Duration::minutes(10), 10)
            .await
            .unwrap();
        assert_eq!(stalled.iter().map(|j| j.id).collect::<Vec<_>>(), [stuck.id]);
    }

    #[tokio::test]
    async fn eviction_removes_only_expired_terminal_jobs() {
        let store = MemoryJobStore::new();
        let now = Utc::now();

        let mut expired = Job::from_new(new_job(user("u_1"), None), uuid::Uuid::now_v7(), now);
        expired.status = JobStatus::Completed;
        expired.expires_at = Some(now - Duration::minutes(1));

        let mut live = expired.clone();
        live.id = uuid::Uuid::now_v7();
        live.expires_at = Some(now + Duration::hours(1));

        let pending = Job::from_new(new_job(user("u_1"), None), uuid::Uuid::now_v7(), now);

        store.insert_raw(expired.clone()).await;
        store.insert_raw(live.clone()).await;
        store.insert_raw(pending.clone()).await;

        assert_eq!(store.evict_expired(now).await.unwrap(), 1);
        assert!(store.get(expired.id).await.unwrap().is_none());
        assert!(store.get(live.id).await.unwrap().is_some());
        assert!(store.get(pending.id).await.unwrap().is_some());
    }
}

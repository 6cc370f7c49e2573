//! Which jobs an actor may see in listings.
//!
//! - PENDING / PROCESSING: always visible to the owner.
//! - COMPLETED: visible to the owner while `now < expires_at`.
//! - FAILED: visible to the owner only within a short window after creation,
//!   even though the record may still be in the store.

use chrono::Duration;

use crate::job::{Actor, Job, JobStatus};
use crate::types::Timestamp;

/// Default window during which a FAILED job stays listed (1 hour).
pub const DEFAULT_FAILED_VISIBILITY_MINS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct VisibilityRules {
    pub failed_window: Duration,
}

impl Default for VisibilityRules {
    fn default() -> Self {
        Self {
            failed_window: Duration::minutes(DEFAULT_FAILED_VISIBILITY_MINS),
        }
    }
}

impl VisibilityRules {
    pub fn new(failed_window: Duration) -> Self {
        Self { failed_window }
    }

    /// Whether `job` should appear in `actor`'s listing at `now`.
    pub fn is_visible(&self, job: &Job, actor: &Actor, now: Timestamp) -> bool {
        job.is_owned_by(actor) && self.admits(job, now)
    }

    /// The status half of [`Self::is_visible`], without the ownership check.
    ///
    /// Stores apply this before their page limit so hidden jobs never take
    /// up listing slots.
    pub fn admits(&self, job: &Job, now: Timestamp) -> bool {
        match job.status {
            JobStatus::Pending | JobStatus::Processing => true,
            JobStatus::Completed => job.expires_at.is_some_and(|at| now < at),
            JobStatus::Failed => job.created_at > self.failed_since(now),
        }
    }

    /// FAILED jobs created at or before this instant are hidden at `now`.
    pub fn failed_since(&self, now: Timestamp) -> Timestamp {
        now - self.failed_window
    }

    /// Filter `jobs` down to those visible to `actor`, keeping order.
    pub fn filter(&self, jobs: Vec<Job>, actor: &Actor, now: Timestamp) -> Vec<Job> {
        jobs.into_iter()
            .filter(|job| self.is_visible(job, actor, now))
            .collect()
    }
}

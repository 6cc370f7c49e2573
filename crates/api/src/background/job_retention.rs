//! Periodic eviction of expired jobs and recovery of stalled ones.
//!
//! Terminal jobs past `expires_at` are removed from the store. PROCESSING
//! jobs with no update within the dispatcher's stall threshold are failed
//! with a `BackendTimeout` reason, so a crash mid-dispatch never leaves a
//! job listed as PROCESSING forever. PENDING jobs are never touched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parcel_db::JobStore;
use parcel_pipeline::JobDispatcher;
use tokio_util::sync::CancellationToken;

/// Run the retention sweep every `interval` until `cancel` is triggered.
pub async fn run(
    store: Arc<dyn JobStore>,
    dispatcher: Arc<JobDispatcher>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Job retention sweep started");

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = interval.tick() => {
                match store.evict_expired(Utc::now()).await {
                    Ok(evicted) => {
                        if evicted > 0 {
                            tracing::info!(evicted, "Job retention: evicted expired jobs");
                        } else {
                            tracing::debug!("Job retention: nothing to evict");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Job retention: sweep failed");
                    }
                }
                match dispatcher.fail_stalled(Utc::now()).await {
                    Ok(0) => {}
                    Ok(failed) => {
                        tracing::warn!(failed, "Job retention: failed stalled jobs");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Job retention: stall sweep failed");
                    }
                }
            }
        }
    }
}

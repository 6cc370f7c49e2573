//! Long-running maintenance tasks spawned from `main`.
//!
//! Each task stops when its `CancellationToken` is cancelled.

pub mod job_retention;

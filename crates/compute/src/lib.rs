//! Client for the stateless compute backend that builds export artifacts.

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod retry;

pub use client::{ComputeBackend, HttpComputeBackend};
pub use error::ComputeError;
pub use payload::{BackendOutput, BackendRequest, BackendResponse};
pub use retry::RetryPolicy;

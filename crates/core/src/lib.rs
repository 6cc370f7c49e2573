//! Parcel domain types shared by every crate in the workspace.
//!
//! - [`job`] -- job model, status lifecycle, actor identity.
//! - [`object_ref`] -- structured blob-storage addresses.
//! - [`visibility`] -- listing visibility rules for job owners.
//! - [`notification`] -- correlation tags and debounced domain events.

pub mod error;
pub mod job;
pub mod notification;
pub mod object_ref;
pub mod types;
pub mod visibility;

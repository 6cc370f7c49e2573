//! Blob-storage access for export artifacts.
//!
//! - [`url::StorageUrlFormat`] -- recover `{bucket, key, region}` from a URL.
//! - [`presign::S3Presigner`] -- mint SigV4 presigned GETs with scope credentials.
//! - [`access::AccessManager`] -- mint-first, stored-URL-fallback resolution.
//! - [`object_store::ObjectStore`] -- whole-object reads and writes.

pub mod access;
pub mod config;
pub mod error;
pub mod object_store;
pub mod presign;
pub mod url;

pub use access::{AccessManager, ResolvedUrl};
pub use error::StorageError;
pub use object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use presign::{S3Presigner, ScopeCredentials, StaticScopeCredentials, UrlSigner};
pub use url::StorageUrlFormat;

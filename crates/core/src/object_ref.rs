//! Structured address of a stored artifact, independent of any signed URL.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `{bucket, key, region}` address of an object in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub region: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            region: region.into(),
        }
    }

    /// Final path segment of the key, used as the download filename.
    ///
    /// Falls back to the whole key when it has no `/`, and to `"download"`
    /// when the key ends with a separator.
    pub fn file_name(&self) -> &str {
        match self.key.rsplit('/').next() {
            Some(name) if !name.is_empty() => name,
            _ => "download",
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{} ({})", self.bucket, self.key, self.region)
    }
}

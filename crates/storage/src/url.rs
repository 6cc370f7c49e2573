//! Parsing of blob-storage URLs into [`ObjectRef`]s.
//!
//! Three shapes are recognized, all under the configured base domain:
//!
//! | Shape                          | Example                                          |
//! |--------------------------------|--------------------------------------------------|
//! | path-style                     | `https://storage.us-east-2.example/b/k/x.zip`    |
//! | virtual-hosted                 | `https://b.storage.us-east-2.example/k/x.zip`    |
//! | virtual-hosted, no region      | `https://b.storage.example/k/x.zip`              |
//!
//! Keys are percent-decoded and the query string is ignored.

use parcel_core::object_ref::ObjectRef;
use regex::Regex;

use crate::error::StorageError;

/// Default base domain for storage hosts.
pub const DEFAULT_BASE_DOMAIN: &str = "example";

/// Default region assumed by region-less hosts.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Compiled matchers for one storage domain.
#[derive(Debug, Clone)]
pub struct StorageUrlFormat {
    base_domain: String,
    default_region: String,
    path_style: Regex,
    virtual_hosted: Regex,
    regionless: Regex,
}

impl StorageUrlFormat {
    pub fn new(base_domain: &str, default_region: &str) -> Self {
        let domain = regex::escape(base_domain);
        let compile = |pattern: String| Regex::new(&pattern).expect("storage URL pattern must compile");

        Self {
            base_domain: base_domain.to_string(),
            default_region: default_region.to_string(),
            path_style: compile(format!(
                r"^https?://storage\.([a-z0-9-]+)\.{domain}/([^/?#]+)/([^?#]+)"
            )),
            virtual_hosted: compile(format!(
                r"^https?://([a-z0-9][a-z0-9.-]*?)\.storage\.([a-z0-9-]+)\.{domain}/([^?#]+)"
            )),
            regionless: compile(format!(
                r"^https?://([a-z0-9][a-z0-9.-]*?)\.storage\.{domain}/([^?#]+)"
            )),
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Regional endpoint used for path-style requests.
    pub fn endpoint(&self, region: &str) -> String {
        format!("https://storage.{region}.{}", self.base_domain)
    }

    /// Recover the structured reference behind a storage URL.
    pub fn parse(&self, url: &str) -> Result<ObjectRef, StorageError> {
        let unrecognized = || StorageError::UnrecognizedUrlFormat(url.to_string());

        let (bucket, key, region) = if let Some(c) = self.path_style.captures(url) {
            (c[2].to_string(), c[3].to_string(), c[1].to_string())
        } else if let Some(c) = self.virtual_hosted.captures(url) {
            (c[1].to_string(), c[3].to_string(), c[2].to_string())
        } else if let Some(c) = self.regionless.captures(url) {
            (c[1].to_string(), c[2].to_string(), self.default_region.clone())
        } else {
            return Err(unrecognized());
        };

        let key = urlencoding::decode(&key).map_err(|_| unrecognized())?;
        if key.is_empty() || key.ends_with('/') {
            return Err(unrecognized());
        }

        Ok(ObjectRef::new(bucket, key.into_owned(), region))
    }
}

impl Default for StorageUrlFormat {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DOMAIN, DEFAULT_REGION)
    }
}

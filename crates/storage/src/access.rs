//! Presigned-access manager: URL parsing plus fresh URL minting.

use std::sync::Arc;
use std::time::Duration;

use parcel_core::object_ref::ObjectRef;

use crate::error::StorageError;
use crate::presign::UrlSigner;
use crate::url::StorageUrlFormat;

/// Default lifetime of a freshly minted access URL (3 days).
pub const DEFAULT_URL_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// Where a served URL came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedUrl {
    /// Minted just now with scope credentials.
    Minted(String),
    /// The URL stored at completion, served because minting failed or no
    /// structured reference exists.
    Stored(String),
}

impl ResolvedUrl {
    pub fn url(&self) -> &str {
        match self {
            ResolvedUrl::Minted(url) | ResolvedUrl::Stored(url) => url,
        }
    }

    pub fn is_minted(&self) -> bool {
        matches!(self, ResolvedUrl::Minted(_))
    }
}

/// Parses backend URLs and mints fresh time-limited URLs for stored objects.
#[derive(Clone)]
pub struct AccessManager {
    format: StorageUrlFormat,
    signer: Arc<dyn UrlSigner>,
    default_ttl: Duration,
}

impl AccessManager {
    pub fn new(format: StorageUrlFormat, signer: Arc<dyn UrlSigner>, default_ttl: Duration) -> Self {
        Self {
            format,
            signer,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn parse(&self, url: &str) -> Result<ObjectRef, StorageError> {
        self.format.parse(url)
    }

    /// Mint a presigned GET for `object`, valid for `ttl` (or the default).
    pub async fn mint(
        &self,
        scope: &str,
        object: &ObjectRef,
        ttl: Option<Duration>,
    ) -> Result<String, StorageError> {
        self.signer
            .presign_get(scope, object, ttl.unwrap_or(self.default_ttl))
            .await
    }

    /// Pick the URL to serve for one part.
    ///
    /// Mints from `object` when present; on failure logs and falls back to
    /// `stored`. Errors only when neither yields a URL.
    pub async fn resolve(
        &self,
        scope: &str,
        object: Option<&ObjectRef>,
        stored: Option<&str>,
    ) -> Result<ResolvedUrl, StorageError> {
        let object = match object {
            Some(object) => object.clone(),
            None => match stored.map(|url| self.parse(url)) {
                Some(Ok(parsed)) => parsed,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Stored URL is not re-mintable");
                    return stored
                        .map(|url| ResolvedUrl::Stored(url.to_string()))
                        .ok_or(e);
                }
                None => return Err(StorageError::NoAccessUrl),
            },
        };

        match self.mint(scope, &object, None).await {
            Ok(url) => Ok(ResolvedUrl::Minted(url)),
            Err(e) => match stored {
                Some(url) => {
                    tracing::warn!(
                        scope,
                        object = %object,
                        error = %e,
                        "Minting failed, serving stored URL"
                    );
                    Ok(ResolvedUrl::Stored(url.to_string()))
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::presign::{S3Presigner, StaticScopeCredentials};

    struct FailingSigner;

    #[async_trait]
    impl UrlSigner for FailingSigner {
        async fn presign_get(
            &self,
            _scope: &str,
            object: &ObjectRef,
            _ttl: Duration,
        ) -> Result<String, StorageError> {
            Err(StorageError::Presign {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                message: "credentials revoked".into(),
            })
        }
    }

    fn manager(signer: Arc<dyn UrlSigner>) -> AccessManager {
        AccessManager::new(StorageUrlFormat::default(), signer, DEFAULT_URL_TTL)
    }

    fn s3_manager() -> AccessManager {
        manager(Arc::new(S3Presigner::new(
            StorageUrlFormat::default(),
            Arc::new(StaticScopeCredentials::new("AKID", "secret")),
        )))
    }

    #[tokio::test]
    async fn resolve_mints_from_object_ref() {
        let object = ObjectRef::new("bucket1", "exports/x.zip", "us-east-2");
        let resolved = s3_manager()
            .resolve("team_1", Some(&object), Some("https://old"))
            .await
            .unwrap();
        assert!(resolved.is_minted());
        assert!(resolved.url().contains("X-Amz-Expires=259200"));
    }

    #[tokio::test]
    async fn resolve_parses_stored_url_without_ref() {
        let stored = "https://storage.us-east-2.example/bucket1/exports/x.zip?X-Amz-Expires=3600";
        let resolved = s3_manager()
            .resolve("team_1", None, Some(stored))
            .await
            .unwrap();
        assert!(resolved.is_minted());
        assert!(resolved.url().contains("/bucket1/exports/x.zip?"));
    }

    #[tokio::test]
    async fn mint_failure_falls_back_to_stored() {
        let object = ObjectRef::new("bucket1", "x.zip", "us-east-1");
        let resolved = manager(Arc::new(FailingSigner))
            .resolve("team_1", Some(&object), Some("https://stored"))
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedUrl::Stored("https://stored".into()));
    }

    #[tokio::test]
    async fn unparseable_stored_url_is_served_as_is() {
        let resolved = s3_manager()
            .resolve("team_1", None, Some("https://cdn.other.com/x.zip"))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            ResolvedUrl::Stored("https://cdn.other.com/x.zip".into())
        );
    }

    #[tokio::test]
    async fn nothing_to_resolve_is_no_access_url() {
        assert_matches!(
            s3_manager().resolve("team_1", None, None).await,
            Err(StorageError::NoAccessUrl)
        );
    }

    #[tokio::test]
    async fn mint_failure_without_stored_url_errors() {
        let object = ObjectRef::new("bucket1", "x.zip", "us-east-1");
        assert_matches!(
            manager(Arc::new(FailingSigner))
                .resolve("team_1", Some(&object), None)
                .await,
            Err(StorageError::Presign { .. })
        );
    }
}

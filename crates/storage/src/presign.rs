//! SigV4 presigned GET URLs minted with long-lived scope credentials.
//!
//! The compute backend signs its own URLs with short-lived execution-role
//! credentials, which can expire long before the requested link lifetime.
//! Read paths therefore re-mint with credentials owned by the scope.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use parcel_core::object_ref::ObjectRef;

use crate::error::StorageError;
use crate::url::StorageUrlFormat;

/// Longest lifetime a SigV4 presigned URL may carry (7 days).
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Scope credentials
// ---------------------------------------------------------------------------

/// Access key pair owned by a scope (e.g. a team).
#[derive(Clone)]
pub struct ScopeKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for ScopeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeKeys")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Looks up the long-lived keys used to sign URLs for a scope.
pub trait ScopeCredentials: Send + Sync {
    fn keys_for(&self, scope: &str) -> Result<ScopeKeys, StorageError>;
}

/// One key pair for every scope.
#[derive(Debug, Clone)]
pub struct StaticScopeCredentials {
    keys: ScopeKeys,
}

impl StaticScopeCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            keys: ScopeKeys {
                access_key_id: access_key_id.into(),
                secret_access_key: secret_access_key.into(),
            },
        }
    }
}

impl ScopeCredentials for StaticScopeCredentials {
    fn keys_for(&self, _scope: &str) -> Result<ScopeKeys, StorageError> {
        Ok(self.keys.clone())
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

/// Produces a time-limited GET URL for a stored object.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn presign_get(
        &self,
        scope: &str,
        object: &ObjectRef,
        ttl: Duration,
    ) -> Result<String, StorageError>;
}

/// [`UrlSigner`] backed by `aws-sdk-s3` presigning.
///
/// Clients are cached per `(scope, region)`; presigning itself is offline.
pub struct S3Presigner {
    format: StorageUrlFormat,
    credentials: Arc<dyn ScopeCredentials>,
    clients: RwLock<HashMap<(String, String), Client>>,
}

impl S3Presigner {
    pub fn new(format: StorageUrlFormat, credentials: Arc<dyn ScopeCredentials>) -> Self {
        Self {
            format,
            credentials,
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn client_for(&self, scope: &str, region: &str) -> Result<Client, StorageError> {
        let cache_key = (scope.to_string(), region.to_string());

        if let Ok(clients) = self.clients.read() {
            if let Some(client) = clients.get(&cache_key) {
                return Ok(client.clone());
            }
        }

        let keys = self.credentials.keys_for(scope)?;
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(self.format.endpoint(region))
            .force_path_style(true)
            .credentials_provider(Credentials::new(
                keys.access_key_id,
                keys.secret_access_key,
                None,
                None,
                "parcel-scope",
            ))
            .build();
        let client = Client::from_conf(config);

        if let Ok(mut clients) = self.clients.write() {
            clients.insert(cache_key, client.clone());
        }
        Ok(client)
    }
}

#[async_trait]
impl UrlSigner for S3Presigner {
    async fn presign_get(
        &self,
        scope: &str,
        object: &ObjectRef,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        if ttl.is_zero() || ttl > MAX_PRESIGN_TTL {
            return Err(StorageError::InvalidTtl(format!(
                "{}s is outside 1s..={}s",
                ttl.as_secs(),
                MAX_PRESIGN_TTL.as_secs()
            )));
        }
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::InvalidTtl(e.to_string()))?;

        let client = self.client_for(scope, &object.region)?;
        let disposition = format!(
            "attachment; filename=\"{}\"",
            urlencoding::encode(object.file_name())
        );

        let request = client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .response_cache_control("no-cache")
            .response_content_disposition(disposition)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(request.uri().to_string())
    }
}

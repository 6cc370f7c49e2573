//! HTTP client for the compute backend.
//!
//! One endpoint per [`JobKind`]. Each invocation is a single `POST` of a
//! [`BackendRequest`]; transient failures (5xx, connection refused) are
//! retried with exponential backoff up to the policy's attempt cap.

use std::collections::HashMap;

use async_trait::async_trait;
use parcel_core::job::JobKind;

use crate::error::ComputeError;
use crate::payload::{BackendOutput, BackendRequest, BackendResponse};
use crate::retry::{next_delay, RetryPolicy};

/// Invokes the stateless function that produces an artifact.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn invoke(
        &self,
        kind: JobKind,
        request: &BackendRequest,
    ) -> Result<BackendOutput, ComputeError>;
}

/// [`ComputeBackend`] over HTTP using [`reqwest`].
pub struct HttpComputeBackend {
    client: reqwest::Client,
    endpoints: HashMap<JobKind, String>,
    auth_token: Option<String>,
    retry: RetryPolicy,
}

impl HttpComputeBackend {
    pub fn new(endpoints: HashMap<JobKind, String>, retry: RetryPolicy) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints, retry)
    }

    /// Create a backend reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        endpoints: HashMap<JobKind, String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            endpoints,
            auth_token: None,
            retry,
        }
    }

    /// Send `Authorization: Bearer <token>` with every invocation.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    async fn invoke_once(
        &self,
        url: &str,
        request: &BackendRequest,
    ) -> Result<BackendOutput, ComputeError> {
        let mut builder = self.client.post(url).json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Self::parse_output(&body)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComputeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComputeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Validate a 2xx body into a [`BackendOutput`].
    fn parse_output(body: &str) -> Result<BackendOutput, ComputeError> {
        if body.trim().is_empty() {
            return Err(ComputeError::InvalidPayload("empty response body".into()));
        }
        let parsed: BackendResponse = serde_json::from_str(body)
            .map_err(|e| ComputeError::InvalidPayload(format!("malformed JSON: {e}")))?;

        if let Some(message) = parsed.error_message {
            return Err(ComputeError::Backend(message));
        }

        let download_url = parsed.download_url.filter(|u| !u.trim().is_empty());
        if parsed.object_ref.is_none() && download_url.is_none() {
            return Err(ComputeError::InvalidPayload(
                "response has neither objectRef nor downloadUrl".into(),
            ));
        }

        Ok(BackendOutput {
            object_ref: parsed.object_ref,
            download_url,
        })
    }
}

#[async_trait]
impl ComputeBackend for HttpComputeBackend {
    async fn invoke(
        &self,
        kind: JobKind,
        request: &BackendRequest,
    ) -> Result<BackendOutput, ComputeError> {
        let url = self.endpoints.get(&kind).ok_or_else(|| {
            ComputeError::InvalidPayload(format!("no backend endpoint for {}", kind.as_str()))
        })?;

        let mut delay = self.retry.initial_delay;
        let mut attempt = 1u32;
        loop {
            match self.invoke_once(url, request).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        kind = kind.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend failure, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &self.retry);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

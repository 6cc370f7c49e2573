//! One-shot recovery of backend failures caused by problematic inputs.
//!
//! A [`RecoveryStrategy`] rewrites a failed request (e.g. by uploading
//! sanitized copies of its inputs); the dispatcher then retries the
//! invocation exactly once.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parcel_compute::{BackendRequest, ComputeError};
use parcel_storage::{ObjectStore, StorageError};

use crate::docx::{sanitize_docx, SanitizeError, SanitizeMode};

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Sanitizing {key} failed: {source}")]
    Sanitize {
        key: String,
        #[source]
        source: SanitizeError,
    },

    #[error("Sanitizer task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy can address `error` for `request`.
    fn applies_to(&self, request: &BackendRequest, error: &ComputeError) -> bool;

    /// Produce the rewritten request to retry with.
    async fn recover(&self, request: &BackendRequest) -> Result<BackendRequest, RecoveryError>;
}

/// Ordered set of strategies; the first that applies wins.
#[derive(Clone, Default)]
pub struct RecoveryRegistry {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl RecoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn find(
        &self,
        request: &BackendRequest,
        error: &ComputeError,
    ) -> Option<Arc<dyn RecoveryStrategy>> {
        self.strategies
            .iter()
            .find(|s| s.applies_to(request, error))
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// DOCX sanitization
// ---------------------------------------------------------------------------

fn is_docx(key: &str) -> bool {
    Path::new(key)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"))
}

/// `dir/Report.docx` -> `dir/Report.sanitized.docx`.
pub fn sanitized_key(key: &str) -> String {
    let stem_end = key.len() - ".docx".len();
    format!("{}.sanitized.docx", &key[..stem_end])
}

/// Rename `from` to `to` in object keys and string values, recursively.
fn rewrite_folder_structure(value: &mut serde_json::Value, from: &str, to: &str) {
    match value {
        serde_json::Value::String(s) if s == from => *s = to.to_string(),
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_folder_structure(item, from, to);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(v) = map.remove(from) {
                map.insert(to.to_string(), v);
            }
            for v in map.values_mut() {
                rewrite_folder_structure(v, from, to);
            }
        }
        _ => {}
    }
}

/// Re-uploads sanitized copies of every `.docx` input after a backend error.
pub struct DocxSanitizeRecovery {
    objects: Arc<dyn ObjectStore>,
    mode: SanitizeMode,
}

impl DocxSanitizeRecovery {
    pub fn new(objects: Arc<dyn ObjectStore>, mode: SanitizeMode) -> Self {
        Self { objects, mode }
    }
}

#[async_trait]
impl RecoveryStrategy for DocxSanitizeRecovery {
    fn name(&self) -> &'static str {
        "docx_sanitize"
    }

    fn applies_to(&self, request: &BackendRequest, error: &ComputeError) -> bool {
        matches!(error, ComputeError::Backend(_))
            && request.file_keys.iter().any(|k| is_docx(k))
    }

    async fn recover(&self, request: &BackendRequest) -> Result<BackendRequest, RecoveryError> {
        let mut rewritten = request.clone();

        for (i, key) in request.file_keys.iter().enumerate() {
            if !is_docx(key) {
                continue;
            }
            let original = self.objects.get(&request.source_bucket, key).await?;

            let mode = self.mode;
            let (sanitized, report) =
                tokio::task::spawn_blocking(move || sanitize_docx(&original, mode))
                    .await
                    .map_err(|e| RecoveryError::Task(e.to_string()))?
                    .map_err(|source| RecoveryError::Sanitize {
                        key: key.clone(),
                        source,
                    })?;

            let new_key = sanitized_key(key);
            self.objects
                .put(&request.source_bucket, &new_key, sanitized, DOCX_CONTENT_TYPE)
                .await?;

            tracing::info!(
                key = %key,
                sanitized_key = %new_key,
                glossary_removed = report.glossary_removed,
                compat_downgraded = report.compat_downgraded,
                sdt_unwrapped = report.sdt_unwrapped,
                "Uploaded sanitized DOCX",
            );

            rewritten.file_keys[i] = new_key.clone();
            rewrite_folder_structure(&mut rewritten.folder_structure, key, &new_key);
        }

        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use parcel_storage::MemoryObjectStore;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn docx_bytes() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(b"<w:sdt><w:sdtPr></w:sdtPr><w:sdtContent>X</w:sdtContent></w:sdt>")
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn request(keys: &[&str]) -> BackendRequest {
        BackendRequest {
            source_bucket: "uploads".into(),
            file_keys: keys.iter().map(|k| k.to_string()).collect(),
            folder_structure: serde_json::json!({"docs/Plan.docx": "/Legal", "a.pdf": "/"}),
            watermark_config: None,
            part_number: None,
            total_parts: None,
            output_name: "bundle".into(),
            expiration_hours: 72,
        }
    }

    #[test]
    fn sanitized_key_keeps_directory_and_stem() {
        assert_eq!(sanitized_key("docs/Plan.docx"), "docs/Plan.sanitized.docx");
        assert_eq!(sanitized_key("Plan.DOCX"), "Plan.sanitized.docx");
    }

    #[test]
    fn applies_only_to_backend_errors_with_docx_inputs() {
        let strategy =
            DocxSanitizeRecovery::new(Arc::new(MemoryObjectStore::new()), SanitizeMode::All);
        let backend_err = ComputeError::Backend("conversion failed".into());
        let timeout_like = ComputeError::Api {
            status: 504,
            body: String::new(),
        };

        assert!(strategy.applies_to(&request(&["docs/Plan.docx"]), &backend_err));
        assert!(!strategy.applies_to(&request(&["a.pdf"]), &backend_err));
        assert!(!strategy.applies_to(&request(&["docs/Plan.docx"]), &timeout_like));
    }

    #[tokio::test]
    async fn recover_uploads_and_rewrites_keys() {
        let objects = Arc::new(MemoryObjectStore::new());
        objects
            .put("uploads", "docs/Plan.docx", docx_bytes(), DOCX_CONTENT_TYPE)
            .await
            .unwrap();

        let strategy = DocxSanitizeRecovery::new(objects.clone(), SanitizeMode::All);
        let rewritten = strategy
            .recover(&request(&["a.pdf", "docs/Plan.docx"]))
            .await
            .unwrap();

        assert_eq!(rewritten.file_keys, ["a.pdf", "docs/Plan.sanitized.docx"]);
        assert_eq!(
            rewritten.folder_structure["docs/Plan.sanitized.docx"],
            "/Legal"
        );
        assert!(rewritten.folder_structure.get("docs/Plan.docx").is_none());
        assert!(objects.contains("uploads", "docs/Plan.sanitized.docx").await);
    }

    #[tokio::test]
    async fn missing_source_fails_recovery() {
        let strategy =
            DocxSanitizeRecovery::new(Arc::new(MemoryObjectStore::new()), SanitizeMode::All);
        let result = strategy.recover(&request(&["docs/Plan.docx"])).await;
        assert!(matches!(result, Err(RecoveryError::Storage(_))));
    }

    #[test]
    fn registry_picks_first_applicable() {
        let registry = RecoveryRegistry::new().with(Arc::new(DocxSanitizeRecovery::new(
            Arc::new(MemoryObjectStore::new()),
            SanitizeMode::All,
        )));
        let err = ComputeError::Backend("x".into());
        assert_eq!(
            registry
                .find(&request(&["docs/Plan.docx"]), &err)
                .map(|s| s.name()),
            Some("docx_sanitize")
        );
        assert!(registry.find(&request(&["a.pdf"]), &err).is_none());
    }
}

//! Wire types exchanged with the compute backend.

use parcel_core::object_ref::ObjectRef;
use serde::{Deserialize, Serialize};

/// Body of one backend invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendRequest {
    pub source_bucket: String,
    pub file_keys: Vec<String>,
    pub folder_structure: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_config: Option<serde_json::Value>,
    /// 1-based part number; omitted for single-part jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_parts: Option<u32>,
    pub output_name: String,
    pub expiration_hours: u32,
}

/// Raw backend response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub object_ref: Option<ObjectRef>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Validated result of a successful invocation.
///
/// At least one of the two fields is set.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    pub object_ref: Option<ObjectRef>,
    pub download_url: Option<String>,
}

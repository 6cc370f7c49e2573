//! Split a job's sources into backend invocations.

use parcel_compute::BackendRequest;
use parcel_core::job::JobParams;

/// Default cap on source keys per backend invocation.
pub const DEFAULT_MAX_FILES_PER_PART: usize = 500;

/// Build one [`BackendRequest`] per part.
///
/// Single-part jobs carry no part numbering and keep the output name as-is;
/// multi-part jobs number parts from 1 and suffix the output name.
/// Sourceless jobs (e.g. access-log exports) still produce one request.
pub fn partition(params: &JobParams, max_files_per_part: usize) -> Vec<BackendRequest> {
    let per_part = max_files_per_part.max(1);
    let watermark = params
        .transform
        .as_ref()
        .and_then(|t| t.watermark.clone());

    let chunks: Vec<&[String]> = if params.source_objects.is_empty() {
        vec![&params.source_objects[..]]
    } else {
        params.source_objects.chunks(per_part).collect()
    };
    let total = chunks.len() as u32;

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, keys)| {
            let part = i as u32 + 1;
            let multi = total > 1;
            BackendRequest {
                source_bucket: params.source_bucket.clone(),
                file_keys: keys.to_vec(),
                folder_structure: params.folder_structure.clone(),
                watermark_config: watermark.clone(),
                part_number: multi.then_some(part),
                total_parts: multi.then_some(total),
                output_name: if multi {
                    format!("{}-part-{part}", params.output_name)
                } else {
                    params.output_name.clone()
                },
                expiration_hours: params.expiration_hours,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use parcel_core::job::TransformConfig;

    use super::*;

    fn params(n: usize) -> JobParams {
        JobParams {
            source_bucket: "uploads".into(),
            source_objects: (0..n).map(|i| format!("f{i}.pdf")).collect(),
            folder_structure: serde_json::json!({}),
            transform: Some(TransformConfig {
                watermark: Some(serde_json::json!({"text": "CONFIDENTIAL"})),
            }),
            output_name: "Data Room".into(),
            expiration_hours: 72,
        }
    }

    #[test]
    fn small_job_is_single_part() {
        let parts = partition(&params(3), 500);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part_number, None);
        assert_eq!(parts[0].total_parts, None);
        assert_eq!(parts[0].output_name, "Data Room");
        assert_eq!(parts[0].file_keys.len(), 3);
        assert!(parts[0].watermark_config.is_some());
    }

    #[test]
    fn large_job_is_numbered() {
        let parts = partition(&params(1001), 500);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].part_number, Some(3));
        assert_eq!(parts[2].total_parts, Some(3));
        assert_eq!(parts[2].file_keys.len(), 1);
        assert_eq!(parts[0].output_name, "Data Room-part-1");
    }

    #[test]
    fn sourceless_job_still_invokes_once() {
        let parts = partition(&params(0), 500);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].file_keys.is_empty());
    }
}

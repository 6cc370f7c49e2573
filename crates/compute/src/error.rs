/// Errors from the compute backend client.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The backend answered with an error envelope.
    #[error("{0}")]
    Backend(String),

    /// Missing body, malformed JSON, or a body with no usable result.
    #[error("Invalid backend payload: {0}")]
    InvalidPayload(String),
}

impl ComputeError {
    /// Whether a retry may succeed: 5xx responses and connection failures.
    pub fn is_transient(&self) -> bool {
        match self {
            ComputeError::Api { status, .. } => *status >= 500,
            ComputeError::Request(e) => e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        for status in [500, 502, 503] {
            let err = ComputeError::Api {
                status,
                body: String::new(),
            };
            assert!(err.is_transient());
        }
    }

    #[test]
    fn client_and_payload_errors_are_final() {
        let err = ComputeError::Api {
            status: 400,
            body: "bad".into(),
        };
        assert!(!err.is_transient());
        assert!(!ComputeError::Backend("corrupt input".into()).is_transient());
        assert!(!ComputeError::InvalidPayload("empty".into()).is_transient());
    }
}

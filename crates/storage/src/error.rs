use parcel_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unrecognized storage URL format: {0}")]
    UnrecognizedUrlFormat(String),

    /// Neither an object reference nor a stored URL exists for the part.
    #[error("No object reference or stored URL to serve")]
    NoAccessUrl,

    #[error("Invalid access URL lifetime: {0}")]
    InvalidTtl(String),

    #[error("No credentials for scope '{0}'")]
    MissingCredentials(String),

    #[error("Presigning failed for {bucket}/{key}: {message}")]
    Presign {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Object {op} failed for {bucket}/{key}: {message}")]
    Object {
        op: &'static str,
        bucket: String,
        key: String,
        message: String,
    },
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnrecognizedUrlFormat(url) => CoreError::UnrecognizedUrlFormat(url),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

//! Error types and error handling

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Which of the two file lists an index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Files that passed validation and will be uploaded
    Accepted,
    /// Files that failed validation
    Rejected,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// Uploader error type
///
/// Per-file validation failures are not errors at this level: they are
/// collected as [`RejectedFile`](crate::validation::RejectedFile)s and the
/// batch carries on without them.
#[derive(Debug, Error)]
pub enum UploaderError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport could not issue the request
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The operation is not allowed while an upload is running
    #[error("An upload is already in progress")]
    UploadInProgress,

    /// Start was requested with an empty batch
    #[error("No accepted files to upload")]
    NothingToUpload,

    /// Remove or caption targeted a position that does not exist
    #[error("No {kind} file at index {index} (list holds {len})")]
    IndexOutOfRange {
        /// List the index was applied to
        kind: FileKind,
        /// Requested index
        index: usize,
        /// Current list length
        len: usize,
    },
}

/// Result type for uploader operations
pub type UploaderResult<T> = Result<T, UploaderError>;

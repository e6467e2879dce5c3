//! Inbound events and outbound notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FileKind;
use crate::transport::ResponseBody;
use crate::validation::CandidateFile;

/// Where a selection came from; only used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    /// File picker dialog
    Picker,
    /// Drag and drop
    Drop,
}

impl std::fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Picker => f.write_str("picker"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

/// User actions the presentation layer forwards to the controller
#[derive(Debug, Clone)]
pub enum UploaderEvent {
    /// Files were picked or dropped
    FileSelection {
        /// Picked files, in the order the host received them
        files: Vec<CandidateFile>,
        /// Picker or drop zone
        source: SelectionSource,
    },
    /// Upload button pressed
    StartUpload,
    /// Cancel button pressed
    Cancel,
    /// Remove button pressed on a listed file
    Remove {
        /// Position in the list
        index: usize,
        /// Which list
        kind: FileKind,
    },
    /// Reset button pressed
    Reset,
}

/// Identifier of one upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Generate a new random attempt ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// 200 or 201
    Success,
    /// Any other status, or no response at all
    Failure,
}

/// What the endpoint (or the transport) said about an attempt
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Attempt this outcome belongs to
    pub attempt_id: AttemptId,
    /// Success or failure
    pub status: OutcomeStatus,
    /// HTTP status, absent when the request never got a response
    pub status_code: Option<u16>,
    /// Decoded response body
    pub response: ResponseBody,
    /// Transport failure detail
    pub error: Option<String>,
    /// When the terminal event was applied
    pub finished_at: DateTime<Utc>,
}

impl UploadOutcome {
    /// Whether the attempt succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success)
    }
}

/// Per-file entry of a finished batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadInfo {
    /// Multipart field the file was sent under
    pub field_name: String,
    /// File name
    pub file_name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Outcome shared by the whole batch
    pub status: OutcomeStatus,
}

/// Host callbacks
///
/// Both methods default to doing nothing so hosts implement only what they
/// need. They are called synchronously from inside controller methods and
/// must not call back into the controller.
#[cfg_attr(test, mockall::automock)]
pub trait UploadObserver: Send {
    /// Called once per terminal transport event with the decoded response
    fn on_api_response(&mut self, outcome: &UploadOutcome) {
        let _ = outcome;
    }

    /// Called once per finished attempt with the uploaded batch
    fn on_all_done(&mut self, files: &[UploadInfo]) {
        let _ = files;
    }
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {}

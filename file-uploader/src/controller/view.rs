//! Render snapshot for the presentation layer

use serde::Serialize;

use crate::config::{DisplayOptions, Labels, Theme};
use crate::session::{SessionState, StatusMessage};
use crate::validation::{format_size, RejectedFile};

/// Everything a presentation layer needs to draw the widget
///
/// Built by [`UploadController::view`](super::UploadController::view). The
/// snapshot owns its data, so it can be serialized or sent to another thread
/// while the controller keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploaderView {
    /// Lifecycle state
    pub state: SessionState,
    /// Accepted files in upload order
    pub accepted: Vec<AcceptedFileView>,
    /// Files refused by the last selection
    pub rejected: Vec<RejectedFile>,
    /// Upload button enabled
    pub upload_enabled: bool,
    /// Progress bar shown
    pub progress_bar_visible: bool,
    /// An upload is running
    pub upload_started: bool,
    /// Last started upload carried one file
    pub single_file: bool,
    /// Progress, 0 to 100
    pub percent: u8,
    /// Status line of the last finished attempt
    pub message: Option<StatusMessage>,
    /// Size limit hint, e.g. `"Size Limit: 20.00 MB"`
    pub size_limit: String,
    /// Allowed extensions, for the picker's filter
    pub allowed_extensions: Vec<String>,
    /// Resolved texts
    pub labels: Labels,
    /// Widget flavour
    pub theme: Theme,
    /// Presentation switches
    pub display: DisplayOptions,
    /// Several files may be selected
    pub multiple: bool,
}

/// One accepted file as listed in the widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedFileView {
    /// File name
    pub name: String,
    /// Size as produced by [`format_size`]
    pub formatted_size: String,
    /// Caption entered by the user
    pub caption: Option<String>,
    /// Multipart field the file will be sent under
    pub field_name: String,
}

pub(super) fn size_limit_text(labels: &Labels, max_file_size_bytes: u64) -> String {
    format!("{}: {}", labels.size_limit, format_size(max_file_size_bytes))
}

//! Upload session state
//!
//! An [`UploadSession`] holds everything that changes while a user picks files
//! and uploads them: the accepted batch with its captions, the rejected files,
//! the lifecycle [`SessionState`] and the flags the presentation layer renders
//! (upload button enabled, progress bar shown, status message).
//!
//! Only the controller mutates a session. The session enforces its own
//! invariants (a caption always belongs to a file, removals are refused while
//! an upload runs) so it stays consistent however it is driven.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FileKind, UploaderError, UploaderResult};
use crate::validation::{CandidateFile, RejectedFile};

/// Lifecycle of an upload session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing selected
    #[default]
    Idle,

    /// A selection is being classified
    Selecting,

    /// Accepted files are waiting for the upload trigger
    AwaitingStart,

    /// A transport request is live
    InProgress {
        /// Upload progress, 0 to 100
        percent: u8,
    },

    /// The endpoint answered 200 or 201
    Succeeded,

    /// The endpoint answered anything else, or the transport failed
    Failed {
        /// Status message shown to the user
        message: String,
    },

    /// The user stopped the upload before it finished
    Canceled,
}

impl SessionState {
    /// Whether the last upload attempt has finished one way or another
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Canceled)
    }

    /// Whether a transport request is live
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }

    /// Get a human-readable state name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::AwaitingStart => "awaiting_start",
            Self::InProgress { .. } => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An accepted file and the caption the user gave it
#[derive(Debug, Clone)]
pub struct BatchEntry {
    file: CandidateFile,
    caption: Option<String>,
}

impl BatchEntry {
    /// The accepted file
    #[must_use]
    pub const fn file(&self) -> &CandidateFile {
        &self.file
    }

    /// Caption, if one was set and is not blank
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref().filter(|caption| !caption.is_empty())
    }
}

/// Ordered accepted files, each paired with an optional caption
///
/// Captions live next to their file, so removing a file always removes its
/// caption and there can never be more captions than files.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    entries: Vec<BatchEntry>,
}

impl UploadBatch {
    /// Appends an accepted file without a caption
    pub fn push(&mut self, file: CandidateFile) {
        self.entries.push(BatchEntry {
            file,
            caption: None,
        });
    }

    /// Removes and returns the file at `index`
    pub fn remove(&mut self, index: usize) -> Option<CandidateFile> {
        (index < self.entries.len()).then(|| self.entries.remove(index).file)
    }

    /// Sets or clears the caption at `index`; false if there is no such file
    pub fn set_caption(&mut self, index: usize, caption: Option<String>) -> bool {
        self.entries.get_mut(index).is_some_and(|entry| {
            entry.caption = caption;
            true
        })
    }

    /// Multipart field name for the file at `index`
    ///
    /// The caption wins when present; otherwise `"file"` followed by the
    /// index when `indexed` is set, or plain `"file"`.
    #[must_use]
    pub fn field_name(&self, index: usize, indexed: bool) -> String {
        self.entries
            .get(index)
            .and_then(BatchEntry::caption)
            .map_or_else(|| default_field_name(index, indexed), str::to_string)
    }

    /// Drops every file
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no file is accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in selection order
    pub fn iter(&self) -> std::slice::Iter<'_, BatchEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a UploadBatch {
    type Item = &'a BatchEntry;
    type IntoIter = std::slice::Iter<'a, BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Field name used when a file has no caption
#[must_use]
pub fn default_field_name(index: usize, indexed: bool) -> String {
    if indexed {
        format!("file{index}")
    } else {
        "file".to_string()
    }
}

/// Tone of the status message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Upload succeeded
    Success,
    /// Upload failed
    Error,
}

/// Status line shown after an attempt finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Configured text
    pub text: String,
    /// Success or error styling
    pub kind: MessageKind,
}

/// Mutable state of one uploader instance
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    batch: UploadBatch,
    not_allowed_files: Vec<RejectedFile>,
    state: SessionState,
    multiple: bool,
    progress_bar_visible: bool,
    upload_started: bool,
    after_upload: bool,
    single_file: bool,
    percent: u8,
    message: Option<StatusMessage>,
}

impl UploadSession {
    /// Creates an idle session
    #[must_use]
    pub fn new(multiple: bool) -> Self {
        Self {
            multiple,
            single_file: true,
            ..Self::default()
        }
    }

    /// Switches between single and multiple selection for later selections
    pub fn set_multiple(&mut self, multiple: bool) {
        self.multiple = multiple;
    }

    /// Marks a selection as being classified
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::UploadInProgress` while a transport is live.
    pub fn begin_selection(&mut self) -> UploaderResult<()> {
        self.ensure_idle_transport()?;
        self.state = SessionState::Selecting;
        Ok(())
    }

    /// Stores the result of classifying a selection
    ///
    /// The previous batch is dropped first in single-select mode or when it
    /// already went through an upload attempt. Rejections always replace the
    /// previous ones.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::UploadInProgress` while a transport is live.
    pub fn accept_selection(
        &mut self,
        accepted: Vec<CandidateFile>,
        rejected: Vec<RejectedFile>,
    ) -> UploaderResult<()> {
        self.ensure_idle_transport()?;

        if self.after_upload || !self.multiple {
            self.batch.clear();
            self.after_upload = false;
        }

        for file in accepted {
            self.batch.push(file);
        }
        self.not_allowed_files = rejected;

        self.message = None;
        self.upload_started = false;
        self.progress_bar_visible = false;
        self.percent = 0;
        self.state = if self.batch.is_empty() {
            SessionState::Idle
        } else {
            SessionState::AwaitingStart
        };

        debug!(
            accepted = self.batch.len(),
            rejected = self.not_allowed_files.len(),
            state = %self.state,
            "Selection stored"
        );
        Ok(())
    }

    /// Removes an accepted file together with its caption
    ///
    /// # Errors
    ///
    /// Fails while an upload runs or when `index` is out of range.
    pub fn remove_accepted(&mut self, index: usize) -> UploaderResult<CandidateFile> {
        self.ensure_idle_transport()?;
        let len = self.batch.len();
        let removed = self
            .batch
            .remove(index)
            .ok_or(UploaderError::IndexOutOfRange {
                kind: FileKind::Accepted,
                index,
                len,
            })?;

        if self.batch.is_empty() {
            self.state = SessionState::Idle;
        }
        Ok(removed)
    }

    /// Removes a rejected file from the report
    ///
    /// # Errors
    ///
    /// Fails while an upload runs or when `index` is out of range.
    pub fn remove_rejected(&mut self, index: usize) -> UploaderResult<RejectedFile> {
        self.ensure_idle_transport()?;
        if index >= self.not_allowed_files.len() {
            return Err(UploaderError::IndexOutOfRange {
                kind: FileKind::Rejected,
                index,
                len: self.not_allowed_files.len(),
            });
        }
        let removed = self.not_allowed_files.remove(index);

        if self.batch.is_empty() {
            self.state = SessionState::Idle;
        }
        Ok(removed)
    }

    /// Sets or clears the caption of an accepted file
    ///
    /// # Errors
    ///
    /// Fails while an upload runs or when `index` is out of range.
    pub fn set_caption(&mut self, index: usize, caption: Option<String>) -> UploaderResult<()> {
        self.ensure_idle_transport()?;
        if self.batch.set_caption(index, caption) {
            Ok(())
        } else {
            Err(UploaderError::IndexOutOfRange {
                kind: FileKind::Accepted,
                index,
                len: self.batch.len(),
            })
        }
    }

    /// Clears files, rejections and every flag; callable at any time
    pub fn reset(&mut self) {
        *self = Self::new(self.multiple);
    }

    /// Enters `InProgress` at 0 percent
    ///
    /// A batch that was delivered successfully is not sent again; a failed or
    /// canceled one is.
    ///
    /// # Errors
    ///
    /// Fails when there is no pending batch or a transport is already live.
    pub fn begin_upload(&mut self) -> UploaderResult<()> {
        self.ensure_idle_transport()?;
        if !self.has_pending_batch() {
            return Err(UploaderError::NothingToUpload);
        }

        self.single_file = self.batch.len() <= 1;
        self.not_allowed_files.clear();
        self.after_upload = false;
        self.progress_bar_visible = true;
        self.upload_started = true;
        self.message = None;
        self.percent = 0;
        self.state = SessionState::InProgress { percent: 0 };
        Ok(())
    }

    /// Records a progress report; returns the new percent
    ///
    /// Out-of-order reports are accepted as they come. A report with a zero
    /// total leaves the percent unchanged. Ignored outside `InProgress`.
    pub fn update_progress(&mut self, loaded: u64, total: u64) -> Option<u8> {
        if !self.state.is_in_progress() {
            return None;
        }

        if total > 0 {
            let loaded = u128::from(loaded.min(total));
            let total = u128::from(total);
            let rounded = (loaded * 100 + total / 2) / total;
            self.percent = u8::try_from(rounded).unwrap_or(100);
            self.state = SessionState::InProgress {
                percent: self.percent,
            };
        }
        Some(self.percent)
    }

    /// Finishes the attempt as a success
    pub fn complete_success(&mut self, text: impl Into<String>) {
        self.finish();
        self.after_upload = true;
        self.message = Some(StatusMessage {
            text: text.into(),
            kind: MessageKind::Success,
        });
        self.state = SessionState::Succeeded;
    }

    /// Finishes the attempt as a failure
    pub fn complete_failure(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.finish();
        self.after_upload = true;
        self.message = Some(StatusMessage {
            text: text.clone(),
            kind: MessageKind::Error,
        });
        self.state = SessionState::Failed { message: text };
    }

    /// Finishes the attempt as canceled
    ///
    /// The batch counts as never sent: it stays ready for a retry and later
    /// selections in multiple mode append to it.
    pub fn mark_canceled(&mut self) {
        self.finish();
        self.state = SessionState::Canceled;
    }

    fn finish(&mut self) {
        self.progress_bar_visible = false;
        self.upload_started = false;
    }

    fn has_pending_batch(&self) -> bool {
        !self.batch.is_empty() && self.state != SessionState::Succeeded
    }

    fn ensure_idle_transport(&self) -> UploaderResult<()> {
        if self.state.is_in_progress() {
            Err(UploaderError::UploadInProgress)
        } else {
            Ok(())
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Accepted files
    #[must_use]
    pub const fn batch(&self) -> &UploadBatch {
        &self.batch
    }

    /// Files refused by the last selection
    #[must_use]
    pub fn not_allowed_files(&self) -> &[RejectedFile] {
        &self.not_allowed_files
    }

    /// Whether the upload trigger should be enabled
    ///
    /// True exactly when [`begin_upload`](Self::begin_upload) would start.
    #[must_use]
    pub fn upload_enabled(&self) -> bool {
        !self.state.is_in_progress() && self.has_pending_batch()
    }

    /// Whether the progress bar should be shown
    #[must_use]
    pub const fn progress_bar_visible(&self) -> bool {
        self.progress_bar_visible
    }

    /// Whether an upload has been started and not finished
    #[must_use]
    pub const fn upload_started(&self) -> bool {
        self.upload_started
    }

    /// Whether the last started upload carried at most one file
    #[must_use]
    pub const fn single_file(&self) -> bool {
        self.single_file
    }

    /// Last progress percent
    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.percent
    }

    /// Status message of the last finished attempt
    #[must_use]
    pub const fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    fn file(name: &str) -> CandidateFile {
        CandidateFile::from_bytes(name, b"data".to_vec())
    }

    fn rejected(name: &str) -> RejectedFile {
        RejectedFile {
            file_name: name.to_string(),
            formatted_size: "0.00 KB".to_string(),
            reason: ValidationError::InvalidFormat,
        }
    }

    fn names(session: &UploadSession) -> Vec<&str> {
        session.batch().iter().map(|e| e.file().name()).collect()
    }

    #[test]
    fn test_single_select_replaces_batch() {
        let mut session = UploadSession::new(false);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.accept_selection(vec![file("b.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["b.txt"]);
        assert_eq!(session.state(), &SessionState::AwaitingStart);
        assert!(session.upload_enabled());
    }

    #[test]
    fn test_multi_select_accumulates_until_upload() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![rejected("x.exe")]).unwrap();
        session.accept_selection(vec![file("b.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["a.txt", "b.txt"]);
        // rejections never accumulate
        assert!(session.not_allowed_files().is_empty());

        session.begin_upload().unwrap();
        session.complete_success("ok");
        session.accept_selection(vec![file("c.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["c.txt"]);

        session.accept_selection(vec![file("d.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["c.txt", "d.txt"]);
    }

    #[test]
    fn test_canceled_batch_keeps_accumulating() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();
        session.mark_canceled();

        session.accept_selection(vec![file("b.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["a.txt", "b.txt"]);
        assert_eq!(session.state(), &SessionState::AwaitingStart);
    }

    #[test]
    fn test_canceled_retry_of_failed_batch_keeps_it() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();
        session.complete_failure("Upload Failed !");
        session.begin_upload().unwrap();
        session.mark_canceled();

        session.accept_selection(vec![file("b.txt")], vec![]).unwrap();
        assert_eq!(names(&session), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_upload_enabled_matches_start_rule() {
        let mut session = UploadSession::new(false);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();
        session.complete_failure("Upload Failed !");
        assert!(session.upload_enabled());

        session.begin_upload().unwrap();
        session.complete_success("ok");
        assert!(!session.upload_enabled());
        assert!(matches!(session.begin_upload(), Err(UploaderError::NothingToUpload)));
        assert_eq!(session.state(), &SessionState::Succeeded);
    }

    #[test]
    fn test_empty_selection_goes_idle() {
        let mut session = UploadSession::new(false);
        session.accept_selection(vec![], vec![rejected("x.exe")]).unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(!session.upload_enabled());
        assert_eq!(session.not_allowed_files().len(), 1);
    }

    #[test]
    fn test_remove_keeps_captions_aligned() {
        let mut session = UploadSession::new(true);
        session
            .accept_selection(vec![file("a.txt"), file("b.txt"), file("c.txt")], vec![])
            .unwrap();
        session.set_caption(1, Some("invoice".into())).unwrap();
        session.set_caption(2, Some("receipt".into())).unwrap();

        session.remove_accepted(0).unwrap();
        assert_eq!(session.batch().field_name(0, true), "invoice");
        assert_eq!(session.batch().field_name(1, true), "receipt");

        session.remove_accepted(0).unwrap();
        session.remove_accepted(0).unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(!session.upload_enabled());
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![rejected("b.exe")]).unwrap();
        assert!(matches!(
            session.remove_accepted(3),
            Err(UploaderError::IndexOutOfRange { kind: FileKind::Accepted, index: 3, len: 1 })
        ));
        assert!(session.remove_rejected(0).is_ok());
        assert!(matches!(
            session.remove_rejected(0),
            Err(UploaderError::IndexOutOfRange { kind: FileKind::Rejected, .. })
        ));
        assert_eq!(session.state(), &SessionState::AwaitingStart);
    }

    #[test]
    fn test_field_names() {
        let mut batch = UploadBatch::default();
        for name in ["a", "b", "c"] {
            batch.push(file(name));
        }
        let indexed: Vec<String> = (0..3).map(|i| batch.field_name(i, true)).collect();
        assert_eq!(indexed, vec!["file0", "file1", "file2"]);
        let plain: Vec<String> = (0..3).map(|i| batch.field_name(i, false)).collect();
        assert_eq!(plain, vec!["file", "file", "file"]);

        batch.set_caption(1, Some(String::new()));
        assert_eq!(batch.field_name(1, true), "file1");
        batch.set_caption(1, Some("photo".into()));
        assert_eq!(batch.field_name(1, false), "photo");
        assert!(!batch.set_caption(7, Some("nope".into())));
    }

    #[test]
    fn test_progress_rounding_and_guards() {
        let mut session = UploadSession::new(true);
        assert_eq!(session.update_progress(1, 2), None);

        session.accept_selection(vec![file("a.txt"), file("b.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();
        assert!(!session.single_file());
        assert_eq!(session.update_progress(1, 3), Some(33));
        assert_eq!(session.update_progress(2, 3), Some(67));
        // last value wins, even when it goes backwards
        assert_eq!(session.update_progress(1, 10), Some(10));
        assert_eq!(session.update_progress(5, 0), Some(10));
        assert_eq!(session.update_progress(20, 10), Some(100));
        assert_eq!(session.state(), &SessionState::InProgress { percent: 100 });
        assert!(!session.upload_enabled());
    }

    #[test]
    fn test_operations_refused_while_uploading() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();

        assert!(matches!(session.begin_upload(), Err(UploaderError::UploadInProgress)));
        assert!(matches!(session.remove_accepted(0), Err(UploaderError::UploadInProgress)));
        assert!(matches!(session.begin_selection(), Err(UploaderError::UploadInProgress)));
    }

    #[test]
    fn test_failure_and_cancel_flags() {
        let mut session = UploadSession::new(false);
        session.accept_selection(vec![file("a.txt")], vec![]).unwrap();
        session.begin_upload().unwrap();
        session.complete_failure("Upload Failed !");
        assert_eq!(
            session.state(),
            &SessionState::Failed { message: "Upload Failed !".into() }
        );
        assert_eq!(session.message().unwrap().kind, MessageKind::Error);
        assert!(!session.progress_bar_visible());
        assert!(!session.upload_started());
        assert_eq!(session.batch().len(), 1);

        session.begin_upload().unwrap();
        session.mark_canceled();
        assert_eq!(session.state(), &SessionState::Canceled);
        assert!(session.upload_enabled());
        assert!(session.message().is_none());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut session = UploadSession::new(true);
        session.accept_selection(vec![file("a.txt")], vec![rejected("b.exe")]).unwrap();
        session.begin_upload().unwrap();
        session.update_progress(50, 100);

        session.reset();
        assert_eq!(session.state(), &SessionState::Idle);
        assert!(session.batch().is_empty());
        assert!(session.not_allowed_files().is_empty());
        assert!(!session.upload_enabled());
        assert!(!session.progress_bar_visible());
        assert_eq!(session.percent(), 0);
    }
}

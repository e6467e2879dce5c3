//! Upload controller
//!
//! The [`UploadController`] is the single entry point of the core. It owns the
//! [`UploadSession`], validates selections, builds the multipart request,
//! hands it to a [`TransportAdapter`] and applies the transport's events.
//!
//! # State machine
//!
//! ```text
//! Idle -> Selecting -> AwaitingStart | Idle
//! AwaitingStart -> InProgress -> Succeeded | Failed | Canceled
//! any -> Idle (reset)
//! ```
//!
//! All transitions happen inside `&mut self` calls. Starting an upload
//! returns as soon as the transport accepted the request; events are then
//! applied either by awaiting [`UploadController::drive`] or by feeding them
//! to [`UploadController::handle_transfer_event`].
//!
//! # Example
//!
//! ```rust,no_run
//! use file_uploader::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UploadConfiguration::builder()
//!     .endpoint_url("https://files.example.com/upload")
//!     .multiple(true)
//!     .build()?;
//!
//! let mut controller = UploadController::new(config, Arc::new(ReqwestTransport::new()?))?;
//! controller.select_files(
//!     vec![CandidateFile::from_path("report.pdf")?],
//!     SelectionSource::Picker,
//! )?;
//! controller.start_upload()?;
//!
//! let state = controller.run_to_completion().await;
//! println!("{state:?}");
//! # Ok(())
//! # }
//! ```

mod events;
mod view;

pub use events::{
    AttemptId, NoopObserver, OutcomeStatus, SelectionSource, UploadInfo, UploadObserver,
    UploadOutcome, UploaderEvent,
};
pub use view::{AcceptedFileView, UploaderView};

use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, Labels, UploadConfiguration};
use crate::error::{FileKind, UploaderError, UploaderResult};
use crate::session::{SessionState, UploadSession};
use crate::transport::{
    CancellationToken, MultipartField, ResponseBody, TransferEvent, TransferHandle,
    TransferRequest, TransportAdapter,
};
use crate::validation::{CandidateFile, Classification, FileValidator};

/// Detail reported when a transfer ends without a terminal event
const TRANSFER_ABANDONED: &str = "transfer ended without a response";

/// The live request of the current attempt
struct ActiveTransfer {
    attempt_id: AttemptId,
    handle: TransferHandle,
    files: Vec<SentFile>,
}

/// What was sent for one file, kept for the batch report
struct SentFile {
    field_name: String,
    file_name: String,
    size_bytes: u64,
}

/// Drives file selection, validation and upload for one widget instance
pub struct UploadController {
    config: UploadConfiguration,
    endpoint: Url,
    labels: Labels,
    validator: FileValidator,
    session: UploadSession,
    transport: Arc<dyn TransportAdapter>,
    observer: Box<dyn UploadObserver>,
    active: Option<ActiveTransfer>,
}

impl std::fmt::Debug for UploadController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadController")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", self.session.state())
            .field("files", &self.session.batch().len())
            .field(
                "active_attempt",
                &self.active.as_ref().map(|active| active.attempt_id),
            )
            .finish_non_exhaustive()
    }
}

impl UploadController {
    /// Creates a controller for a validated configuration
    ///
    /// # Errors
    ///
    /// Returns the first problem [`UploadConfiguration::validate`] finds.
    pub fn new(
        config: UploadConfiguration,
        transport: Arc<dyn TransportAdapter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoint = config.endpoint()?;

        Ok(Self {
            labels: config.labels(),
            validator: FileValidator::from_config(&config),
            session: UploadSession::new(config.multiple),
            endpoint,
            config,
            transport,
            observer: Box::new(NoopObserver),
            active: None,
        })
    }

    /// Registers the host callbacks
    #[must_use]
    pub fn with_observer(mut self, observer: impl UploadObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Replaces the configuration
    ///
    /// Labels, size limit and extension policy are re-derived. The current
    /// batch is kept; a running upload finishes against its original request.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] and keeps the previous configuration when
    /// the new one is invalid.
    pub fn apply_configuration(&mut self, config: UploadConfiguration) -> Result<(), ConfigError> {
        config.validate()?;
        self.endpoint = config.endpoint()?;
        self.labels = config.labels();
        self.validator = FileValidator::from_config(&config);
        self.session.set_multiple(config.multiple);
        self.config = config;

        debug!(endpoint = %self.endpoint, "Configuration applied");
        Ok(())
    }

    /// Validates and stores a selection
    ///
    /// Returns the attempt started automatically in attach-pin mode.
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::UploadInProgress` while an upload runs, or the
    /// error of the automatic start.
    pub fn select_files(
        &mut self,
        files: Vec<CandidateFile>,
        source: SelectionSource,
    ) -> UploaderResult<Option<AttemptId>> {
        if let Err(e) = self.session.begin_selection() {
            warn!(%source, files = files.len(), "Selection refused while uploading");
            return Err(e);
        }

        let Classification { accepted, rejected } = self.validator.classify(files);
        info!(
            %source,
            accepted = accepted.len(),
            rejected = rejected.len(),
            "Files selected"
        );
        for file in &rejected {
            debug!(file = %file.file_name, size = %file.formatted_size, reason = %file.reason, "File rejected");
        }
        self.session.accept_selection(accepted, rejected)?;

        if self.config.uploads_immediately() && !self.session.batch().is_empty() {
            return self.start_upload().map(Some);
        }
        Ok(None)
    }

    /// Sends the current batch
    ///
    /// # Errors
    ///
    /// Returns `UploaderError::NothingToUpload` for an empty batch and
    /// `UploaderError::UploadInProgress` while an upload runs; in both cases
    /// nothing changes and no request is made. A transport that refuses the
    /// request yields `UploaderError::Transport` and finishes the attempt as
    /// failed.
    pub fn start_upload(&mut self) -> UploaderResult<AttemptId> {
        if self.active.is_some() {
            debug!("Start ignored; upload already in progress");
            return Err(UploaderError::UploadInProgress);
        }
        if let Err(e) = self.session.begin_upload() {
            debug!(error = %e, "Start ignored");
            return Err(e);
        }

        let attempt_id = AttemptId::new();
        let request = self.build_request();
        let files: Vec<SentFile> = request
            .fields
            .iter()
            .map(|field| SentFile {
                field_name: field.field_name.clone(),
                file_name: field.file_name.clone(),
                size_bytes: field.size_bytes,
            })
            .collect();

        info!(
            %attempt_id,
            files = files.len(),
            total_bytes = request.total_bytes(),
            method = %request.method,
            "Upload started"
        );

        match self.transport.send(request) {
            Ok(handle) => {
                self.active = Some(ActiveTransfer {
                    attempt_id,
                    handle,
                    files,
                });
                Ok(attempt_id)
            }
            Err(e) => {
                warn!(%attempt_id, error = %e, "Transport refused upload");
                self.finish(
                    attempt_id,
                    files,
                    None,
                    ResponseBody::Empty,
                    Some(e.to_string()),
                );
                Err(e.into())
            }
        }
    }

    fn build_request(&self) -> TransferRequest {
        let batch = self.session.batch();
        let indexed = self.config.use_indexed_field_names;
        let fields = batch
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let file = entry.file();
                MultipartField {
                    field_name: batch.field_name(index, indexed),
                    file_name: file.name().to_string(),
                    content_type: file.content_type(),
                    size_bytes: file.size_bytes(),
                    source: file.source().clone(),
                }
            })
            .collect();

        TransferRequest {
            url: self.endpoint.clone(),
            method: self.config.http_method,
            headers: self.config.headers.clone(),
            query_params: self.config.query_params.clone(),
            fields,
            response_type: self.config.response_type,
        }
    }

    /// Applies one transport event to the active attempt
    ///
    /// Returns false when there is no active attempt (after a reset, cancel
    /// or terminal event), in which case the event is dropped.
    pub fn handle_transfer_event(&mut self, event: TransferEvent) -> bool {
        let Some(attempt_id) = self.active.as_ref().map(|active| active.attempt_id) else {
            trace!(?event, "Transfer event without active upload ignored");
            return false;
        };

        match event {
            TransferEvent::Progress { loaded, total } => {
                if let Some(percent) = self.session.update_progress(loaded, total) {
                    trace!(%attempt_id, loaded, total, percent, "Upload progress");
                }
            }
            TransferEvent::Complete { status_code, body } => {
                if let Some(active) = self.active.take() {
                    self.finish(active.attempt_id, active.files, Some(status_code), body, None);
                }
            }
            TransferEvent::TransportError { detail } => {
                if let Some(active) = self.active.take() {
                    self.finish(
                        active.attempt_id,
                        active.files,
                        None,
                        ResponseBody::Empty,
                        Some(detail),
                    );
                }
            }
        }
        true
    }

    fn finish(
        &mut self,
        attempt_id: AttemptId,
        files: Vec<SentFile>,
        status_code: Option<u16>,
        response: ResponseBody,
        error: Option<String>,
    ) {
        let status = match status_code {
            Some(200 | 201) => OutcomeStatus::Success,
            _ => OutcomeStatus::Failure,
        };

        match status {
            OutcomeStatus::Success => {
                info!(%attempt_id, ?status_code, "Upload succeeded");
                self.session
                    .complete_success(self.labels.after_upload_success.clone());
            }
            OutcomeStatus::Failure => {
                warn!(%attempt_id, ?status_code, error = ?error, "Upload failed");
                self.session
                    .complete_failure(self.labels.after_upload_error.clone());
            }
        }

        let outcome = UploadOutcome {
            attempt_id,
            status,
            status_code,
            response,
            error,
            finished_at: Utc::now(),
        };
        self.observer.on_api_response(&outcome);

        let report: Vec<UploadInfo> = files
            .into_iter()
            .map(|file| UploadInfo {
                field_name: file.field_name,
                file_name: file.file_name,
                size_bytes: file.size_bytes,
                status,
            })
            .collect();
        self.observer.on_all_done(&report);
    }

    /// Waits for the next transport event and applies it
    ///
    /// Returns the resulting state, or `None` when no upload is active. A
    /// transfer cancelled through its token ends as `Canceled`; one that goes
    /// away without a terminal event ends as `Failed`.
    pub async fn drive(&mut self) -> Option<SessionState> {
        let active = self.active.as_mut()?;
        let event = active.handle.next_event().await;

        match event {
            Some(event) => {
                self.handle_transfer_event(event);
            }
            None if self.active.as_ref().is_some_and(|a| a.handle.is_cancelled()) => {
                self.cancel();
            }
            None => {
                self.handle_transfer_event(TransferEvent::TransportError {
                    detail: TRANSFER_ABANDONED.to_string(),
                });
            }
        }
        Some(self.session.state().clone())
    }

    /// Drives the active upload until it finishes
    ///
    /// Returns the final state, or the current one when nothing is running.
    pub async fn run_to_completion(&mut self) -> SessionState {
        while self.active.is_some() {
            self.drive().await;
        }
        self.session.state().clone()
    }

    /// Cancels the running upload
    ///
    /// The session ends as `Canceled` with the batch kept for a retry. No
    /// host callback fires. Returns false when nothing was running.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            debug!("Cancel ignored; no upload in progress");
            return false;
        };

        active.handle.cancel();
        self.session.mark_canceled();
        info!(attempt_id = %active.attempt_id, "Upload canceled");
        true
    }

    /// Token of the running upload, for cancelling from another task
    #[must_use]
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.active
            .as_ref()
            .map(|active| active.handle.cancellation_token())
    }

    /// Removes a file from the accepted or rejected list
    ///
    /// # Errors
    ///
    /// Fails while an upload runs or when `index` is out of range.
    pub fn remove(&mut self, index: usize, kind: FileKind) -> UploaderResult<()> {
        let name = match kind {
            FileKind::Accepted => self.session.remove_accepted(index)?.name().to_string(),
            FileKind::Rejected => self.session.remove_rejected(index)?.file_name,
        };
        debug!(%kind, index, file = %name, "File removed");
        Ok(())
    }

    /// Sets or clears the caption used as field name for an accepted file
    ///
    /// # Errors
    ///
    /// Fails while an upload runs or when `index` is out of range.
    pub fn set_caption(&mut self, index: usize, caption: Option<String>) -> UploaderResult<()> {
        self.session.set_caption(index, caption)
    }

    /// Returns to `Idle` with everything cleared
    ///
    /// A running request is not cancelled; its events are discarded.
    pub fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            warn!(
                attempt_id = %active.attempt_id,
                "Reset during upload; request left running and its events discarded"
            );
        }
        self.session.reset();
        debug!("Uploader reset");
    }

    /// Applies a user action
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation. Cancel and reset never
    /// fail.
    pub fn dispatch(&mut self, event: UploaderEvent) -> UploaderResult<()> {
        match event {
            UploaderEvent::FileSelection { files, source } => {
                self.select_files(files, source).map(|_| ())
            }
            UploaderEvent::StartUpload => self.start_upload().map(|_| ()),
            UploaderEvent::Cancel => {
                self.cancel();
                Ok(())
            }
            UploaderEvent::Remove { index, kind } => self.remove(index, kind),
            UploaderEvent::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    /// Snapshot of everything the presentation layer renders
    #[must_use]
    pub fn view(&self) -> UploaderView {
        let batch = self.session.batch();
        let indexed = self.config.use_indexed_field_names;

        UploaderView {
            state: self.session.state().clone(),
            accepted: batch
                .iter()
                .enumerate()
                .map(|(index, entry)| AcceptedFileView {
                    name: entry.file().name().to_string(),
                    formatted_size: crate::validation::format_size(entry.file().size_bytes()),
                    caption: entry.caption().map(str::to_string),
                    field_name: batch.field_name(index, indexed),
                })
                .collect(),
            rejected: self.session.not_allowed_files().to_vec(),
            upload_enabled: self.session.upload_enabled(),
            progress_bar_visible: self.session.progress_bar_visible(),
            upload_started: self.session.upload_started(),
            single_file: self.session.single_file(),
            percent: self.session.percent(),
            message: self.session.message().cloned(),
            size_limit: view::size_limit_text(&self.labels, self.config.max_file_size_bytes),
            allowed_extensions: self
                .config
                .allowed_extensions
                .iter()
                .map(|extension| format!(".{extension}"))
                .collect(),
            labels: self.labels.clone(),
            theme: self.config.theme,
            display: self.config.display,
            multiple: self.config.multiple,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        self.session.state()
    }

    /// Session with the batch and flags
    #[must_use]
    pub const fn session(&self) -> &UploadSession {
        &self.session
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &UploadConfiguration {
        &self.config
    }

    /// Resolved texts
    #[must_use]
    pub const fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Attempt currently in flight
    #[must_use]
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active.as_ref().map(|active| active.attempt_id)
    }

    /// Whether a request is in flight
    #[must_use]
    pub const fn is_uploading(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for UploadController {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.cancel();
            debug!(attempt_id = %active.attempt_id, "Controller dropped; upload canceled");
        }
    }
}

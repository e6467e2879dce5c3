//! file-uploader: headless core of a multi-file upload widget
//!
//! The crate holds everything a file upload widget does except drawing it:
//! - **Validation**: extension and size policy, with per-file rejection reasons
//! - **Session**: accepted batch, captions, progress and status flags
//! - **Transport**: one multipart HTTP request per upload, streamed with progress
//! - **Controller**: the state machine tying them together
//!
//! A presentation layer (a TUI, a desktop shell, the bundled CLI) forwards
//! user actions as [`UploaderEvent`](controller::UploaderEvent)s, renders the
//! [`UploaderView`](controller::UploaderView) snapshot and receives results
//! through an [`UploadObserver`](controller::UploadObserver).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use file_uploader::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     file_uploader::observability::init()?;
//!
//!     let config = UploadConfiguration::load_for_service("my-app")?;
//!     let transport = Arc::new(ReqwestTransport::new()?);
//!     let mut controller = UploadController::new(config, transport)?;
//!
//!     controller.dispatch(UploaderEvent::FileSelection {
//!         files: vec![CandidateFile::from_path("invoice.pdf")?],
//!         source: SelectionSource::Picker,
//!     })?;
//!     controller.dispatch(UploaderEvent::StartUpload)?;
//!
//!     match controller.run_to_completion().await {
//!         SessionState::Succeeded => println!("uploaded"),
//!         other => println!("upload ended as {other}"),
//!     }
//!     Ok(())
//! }
//! ```

// Lint configuration is handled at the workspace level in Cargo.toml
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod observability;
pub mod session;
pub mod transport;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use file_uploader::prelude::*;
    //! ```

    // Configuration
    pub use crate::config::{
        AllowedExtensions, ConfigError, DisplayOptions, HttpMethod, Labels, ParamValue,
        ResponseType, Theme, UploadConfiguration, UploadConfigurationBuilder,
    };

    // Controller and host interface
    pub use crate::controller::{
        AttemptId, NoopObserver, OutcomeStatus, SelectionSource, UploadController, UploadInfo,
        UploadObserver, UploadOutcome, UploaderEvent, UploaderView,
    };

    // Errors
    pub use crate::error::{FileKind, UploaderError, UploaderResult};

    // Session
    pub use crate::session::{SessionState, StatusMessage, UploadSession};

    // Transport
    pub use crate::transport::{
        CancellationToken, ReqwestTransport, ResponseBody, TransferEvent, TransferHandle,
        TransportAdapter, TransportError,
    };

    // Validation
    pub use crate::validation::{
        format_size, CandidateFile, FileSource, FileValidator, RejectedFile, ValidationError,
    };
}

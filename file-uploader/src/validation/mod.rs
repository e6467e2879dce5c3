//! File selection and policy validation
//!
//! The presentation layer turns whatever its picker or drop zone produced into
//! a list of [`CandidateFile`]s. The [`FileValidator`] splits that list into
//! files that may be uploaded and [`RejectedFile`]s that are only reported
//! back to the user.
//!
//! Validation never fails the whole selection: a rejected file is recorded
//! with its reason and the remaining files carry on.
//!
//! # Examples
//!
//! ```rust
//! use file_uploader::config::UploadConfiguration;
//! use file_uploader::validation::{CandidateFile, FileValidator, ValidationError};
//!
//! let config = UploadConfiguration {
//!     endpoint_url: "https://example.com/upload".into(),
//!     ..UploadConfiguration::default()
//! };
//! let validator = FileValidator::from_config(&config);
//!
//! let outcome = validator.classify(vec![
//!     CandidateFile::from_bytes("photo.JPG", vec![0xFF, 0xD8, 0xFF]),
//!     CandidateFile::from_bytes("script.sh", b"#!/bin/sh".to_vec()),
//! ]);
//!
//! assert_eq!(outcome.accepted.len(), 1);
//! assert_eq!(outcome.rejected[0].reason, ValidationError::InvalidFormat);
//! ```

mod size;

pub use size::format_size;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{AllowedExtensions, UploadConfiguration};

/// Why a file was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// Extension is not in the allowed set
    #[error("Invalid format")]
    InvalidFormat,

    /// File is larger than the size limit
    #[error("Invalid size")]
    InvalidSize,
}

/// Where the bytes of a candidate file live
///
/// The core never reads the bytes itself; it hands the source to the
/// transport when the request body is built. Cloning is cheap in both cases.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file on the local filesystem, streamed at upload time
    Path(PathBuf),

    /// Bytes already held by the host
    Memory(Bytes),
}

/// A file offered for upload, before validation
#[derive(Debug, Clone)]
pub struct CandidateFile {
    name: String,
    size_bytes: u64,
    content_type: Option<String>,
    source: FileSource,
}

impl CandidateFile {
    /// Creates a candidate with an explicit size
    ///
    /// The size is trusted as reported by the host.
    #[must_use]
    pub fn new(name: impl Into<String>, size_bytes: u64, source: FileSource) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            content_type: None,
            source,
        }
    }

    /// Creates a candidate backed by bytes in memory
    ///
    /// # Examples
    ///
    /// ```rust
    /// use file_uploader::validation::CandidateFile;
    ///
    /// let file = CandidateFile::from_bytes("notes.txt", b"hello".to_vec());
    /// assert_eq!(file.size_bytes(), 5);
    /// ```
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(name, data.len() as u64, FileSource::Memory(data))
    }

    /// Creates a candidate for a file on disk, reading its size from metadata
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the metadata cannot be read or the path is not
    /// a regular file.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        Ok(Self::new(name, metadata.len(), FileSource::Path(path.to_path_buf())))
    }

    /// Overrides the content type sent with the file
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File name as shown to the user and sent in the multipart body
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Location of the file contents
    #[must_use]
    pub const fn source(&self) -> &FileSource {
        &self.source
    }

    /// Lower-cased extension, empty when the name has none
    #[must_use]
    pub fn extension(&self) -> String {
        extract_extension(&self.name)
    }

    /// Explicit content type, or one guessed from the extension
    #[must_use]
    pub fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
    }
}

/// Extracts the lower-cased text after the last `.` of a file name
///
/// Names without a dot, or ending in one, have an empty extension.
///
/// # Examples
///
/// ```rust
/// use file_uploader::validation::extract_extension;
///
/// assert_eq!(extract_extension("archive.tar.GZ"), "gz");
/// assert_eq!(extract_extension("README"), "");
/// ```
#[must_use]
pub fn extract_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map_or("", |(_, extension)| extension)
        .to_lowercase()
}

/// A file that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    /// Name of the refused file
    pub file_name: String,
    /// Size as produced by [`format_size`]
    pub formatted_size: String,
    /// First check that failed
    pub reason: ValidationError,
}

impl RejectedFile {
    fn new(file: &CandidateFile, reason: ValidationError) -> Self {
        Self {
            file_name: file.name().to_string(),
            formatted_size: format_size(file.size_bytes()),
            reason,
        }
    }
}

/// Result of classifying a selection
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Files that passed both checks, in input order
    pub accepted: Vec<CandidateFile>,
    /// Files that failed, in input order
    pub rejected: Vec<RejectedFile>,
}

/// Extension and size policy check
#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed_extensions: AllowedExtensions,
    max_file_size_bytes: u64,
}

impl FileValidator {
    /// Creates a validator for an explicit policy
    #[must_use]
    pub const fn new(allowed_extensions: AllowedExtensions, max_file_size_bytes: u64) -> Self {
        Self {
            allowed_extensions,
            max_file_size_bytes,
        }
    }

    /// Creates a validator for the policy in a configuration
    #[must_use]
    pub fn from_config(config: &UploadConfiguration) -> Self {
        Self::new(config.allowed_extensions.clone(), config.max_file_size_bytes)
    }

    /// Checks one file; the format check runs before the size check
    ///
    /// # Errors
    ///
    /// Returns the reason the file is refused.
    pub fn check(&self, file: &CandidateFile) -> Result<(), ValidationError> {
        if !self.allowed_extensions.contains(&file.extension()) {
            return Err(ValidationError::InvalidFormat);
        }
        if file.size_bytes() > self.max_file_size_bytes {
            return Err(ValidationError::InvalidSize);
        }
        Ok(())
    }

    /// Splits a selection into accepted and rejected files, preserving order
    #[must_use]
    pub fn classify(&self, files: impl IntoIterator<Item = CandidateFile>) -> Classification {
        let mut outcome = Classification::default();
        for file in files {
            match self.check(&file) {
                Ok(()) => outcome.accepted.push(file),
                Err(reason) => outcome.rejected.push(RejectedFile::new(&file, reason)),
            }
        }
        outcome
    }
}

/// Classifies `files` against the policy in `config`
#[must_use]
pub fn classify(
    files: impl IntoIterator<Item = CandidateFile>,
    config: &UploadConfiguration,
) -> Classification {
    FileValidator::from_config(config).classify(files)
}

//! file-uploader CLI library
//!
//! Command definitions live here so they can be exercised without spawning
//! the binary.

pub mod commands;
pub mod options;

pub use commands::{CheckCommand, UploadCommand};
pub use options::PolicyArgs;

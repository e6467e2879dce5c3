//! CLI command implementations

pub mod check;
pub mod upload;

pub use check::CheckCommand;
pub use upload::UploadCommand;

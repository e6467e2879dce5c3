//! Flags shared by the commands and how they map onto a configuration

use anyhow::{bail, Context, Result};
use clap::Args;
use file_uploader::config::{AllowedExtensions, ParamValue, UploadConfiguration, BYTES_PER_MB};
use file_uploader::validation::CandidateFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Validation policy flags
#[derive(Debug, Clone, Default, Args)]
pub struct PolicyArgs {
    /// Configuration file (TOML); `UPLOADER_*` variables still apply
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Per-file size limit in MB (1 MB = 1,024,000 bytes)
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<u64>,

    /// Allowed extensions, comma separated (e.g. ".jpg,.png"); "." allows none
    #[arg(long, value_name = "LIST")]
    pub formats: Option<String>,
}

impl PolicyArgs {
    /// Configuration from the file (or the defaults) with policy flags applied
    ///
    /// The result is not validated; commands that need an endpoint do that.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is missing or cannot be
    /// parsed.
    pub fn configuration(&self) -> Result<UploadConfiguration> {
        let mut config = match &self.config {
            Some(path) if !path.is_file() => {
                bail!("Configuration file {} not found", path.display())
            }
            Some(path) => UploadConfiguration::extract_from(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => UploadConfiguration::default(),
        };

        if let Some(mb) = self.max_size_mb {
            config.max_file_size_bytes = mb.saturating_mul(BYTES_PER_MB);
        }
        if let Some(formats) = &self.formats {
            config.allowed_extensions = AllowedExtensions::parse(formats);
        }
        Ok(config)
    }
}

/// Parses `NAME:VALUE`
///
/// # Errors
///
/// Returns a message when the colon or the name is missing.
pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    split_pair(raw, ':').ok_or_else(|| format!("expected NAME:VALUE, got {raw:?}"))
}

/// Parses `NAME=VALUE`
///
/// # Errors
///
/// Returns a message when the equals sign or the name is missing.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    split_pair(raw, '=').ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}

fn split_pair(raw: &str, separator: char) -> Option<(String, String)> {
    let (name, value) = raw.split_once(separator)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Groups repeated names into lists, keeping first-seen order of values
#[must_use]
pub fn group_pairs(pairs: &[(String, String)]) -> BTreeMap<String, ParamValue> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in pairs {
        grouped.entry(name.clone()).or_default().push(value.clone());
    }
    grouped
        .into_iter()
        .map(|(name, mut values)| {
            let value = if values.len() == 1 {
                ParamValue::One(values.remove(0))
            } else {
                ParamValue::Many(values)
            };
            (name, value)
        })
        .collect()
}

/// Reads size metadata for every path
///
/// # Errors
///
/// Returns an error naming the first path that is missing or not a file.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<CandidateFile>> {
    paths.iter().map(PathBuf::as_path).map(candidate).collect()
}

fn candidate(path: &Path) -> Result<CandidateFile> {
    CandidateFile::from_path(path).with_context(|| format!("Cannot read {}", path.display()))
}

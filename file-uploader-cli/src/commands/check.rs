//! Validate files without uploading them

use anyhow::Result;
use clap::Args;
use console::{style, Emoji};
use file_uploader::validation::{format_size, Classification, FileValidator};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::options::{collect_files, PolicyArgs};

static ACCEPTED: Emoji = Emoji("✓ ", "+ ");
static REJECTED: Emoji = Emoji("✗ ", "x ");

/// Check files against the extension and size policy
#[derive(Debug, Clone, Args)]
pub struct CheckCommand {
    /// Files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

impl CheckCommand {
    /// Classifies the files
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or a file
    /// cannot be read.
    pub fn run(&self) -> Result<Classification> {
        let config = self.policy.configuration()?;
        let files = collect_files(&self.files)?;
        Ok(FileValidator::from_config(&config).classify(files))
    }

    /// Classifies the files and prints the result
    ///
    /// Exits with failure when any file is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or a file
    /// cannot be read.
    pub fn execute(&self) -> Result<ExitCode> {
        let outcome = self.run()?;

        for file in &outcome.accepted {
            println!(
                "{}{} {}",
                ACCEPTED,
                style(file.name()).green(),
                style(format_size(file.size_bytes())).dim()
            );
        }
        for file in &outcome.rejected {
            println!(
                "{}{} {} {}",
                REJECTED,
                style(&file.file_name).red(),
                style(&file.formatted_size).dim(),
                style(file.reason).yellow()
            );
        }

        println!();
        println!(
            "{} accepted, {} rejected",
            style(outcome.accepted.len()).green().bold(),
            style(outcome.rejected.len()).red().bold()
        );

        Ok(if outcome.rejected.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

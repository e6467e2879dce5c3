//! file-uploader CLI tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use file_uploader::observability::{self, ObservabilityConfig};
use file_uploader_cli::{CheckCommand, UploadCommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "file-uploader")]
#[command(version)]
#[command(about = "Validate and upload files as multipart HTTP requests", long_about = None)]
struct Cli {
    /// Log what the uploader does
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files to an endpoint
    Upload(UploadCommand),
    /// Check files against the size and extension policy
    Check(CheckCommand),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "file_uploader=debug,file_uploader_cli=debug"
    } else {
        "warn"
    };
    observability::init_with(
        &ObservabilityConfig::new("file-uploader-cli")
            .with_filter(filter)
            .with_json(false),
    )?;

    match cli.command {
        Commands::Upload(command) => command.execute().await,
        Commands::Check(command) => command.execute(),
    }
}

//! Upload files to an endpoint

use anyhow::{Context, Result};
use clap::Args;
use console::{style, Emoji};
use file_uploader::config::{HttpMethod, ResponseType, UploadConfiguration};
use file_uploader::controller::{
    SelectionSource, UploadController, UploadInfo, UploadObserver, UploadOutcome,
};
use file_uploader::session::SessionState;
use file_uploader::transport::{ReqwestTransport, ResponseBody};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::options::{collect_files, group_pairs, parse_header, parse_param, PolicyArgs};

static SUCCESS: Emoji = Emoji("✓ ", "√ ");
static FAILURE: Emoji = Emoji("✗ ", "x ");
static WARNING: Emoji = Emoji("⚠ ", "! ");

/// Upload files as one multipart request
#[derive(Debug, Clone, Args)]
pub struct UploadCommand {
    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Endpoint URL (overrides the configuration file)
    #[arg(short, long)]
    pub url: Option<String>,

    /// HTTP method
    #[arg(short, long)]
    pub method: Option<HttpMethod>,

    /// Extra header as NAME:VALUE (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Query parameter as NAME=VALUE (repeatable)
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Accept more than one file
    #[arg(long)]
    pub multiple: bool,

    /// Send every file as field "file" instead of "file0", "file1", ...
    #[arg(long)]
    pub no_index: bool,

    /// Field name for the accepted file at the same position (repeatable)
    #[arg(long = "caption", value_name = "NAME")]
    pub captions: Vec<String>,

    /// Response decoding: json, text, blob or arraybuffer
    #[arg(long)]
    pub response_type: Option<ResponseType>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub policy: PolicyArgs,
}

impl UploadCommand {
    /// Merged and validated configuration
    ///
    /// Flags win over the configuration file. Headers or parameters given on
    /// the command line replace file entries of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is not a
    /// usable configuration.
    pub fn configuration(&self) -> Result<UploadConfiguration> {
        let mut config = self.policy.configuration()?;

        if let Some(url) = &self.url {
            config.endpoint_url.clone_from(url);
        }
        if let Some(method) = self.method {
            config.http_method = method;
        }
        if let Some(response_type) = self.response_type {
            config.response_type = Some(response_type);
        }
        if self.multiple || self.files.len() > 1 {
            config.multiple = true;
        }
        if self.no_index {
            config.use_indexed_field_names = false;
        }
        config.headers.extend(group_pairs(&self.headers));
        config.query_params.extend(group_pairs(&self.params));

        config.validate().context("Invalid upload configuration")?;
        Ok(config)
    }

    /// Runs the upload, rendering progress until it finishes
    ///
    /// Ctrl-C cancels the request. Exits with failure unless the endpoint
    /// accepted the upload.
    ///
    /// # Errors
    ///
    /// Returns an error for configuration problems, unreadable files, or a
    /// transport that cannot be created.
    pub async fn execute(&self) -> Result<ExitCode> {
        let config = self.configuration()?;
        let files = collect_files(&self.files)?;

        let transport = match self.timeout {
            Some(seconds) => ReqwestTransport::with_timeout(Duration::from_secs(seconds))?,
            None => ReqwestTransport::new()?,
        };
        let report = ResponseReport::default();
        let mut controller =
            UploadController::new(config, Arc::new(transport))?.with_observer(report.clone());

        controller.select_files(files, SelectionSource::Picker)?;
        for rejected in &controller.view().rejected {
            eprintln!(
                "{}{} {} {}",
                WARNING,
                style(&rejected.file_name).yellow(),
                style(&rejected.formatted_size).dim(),
                style(rejected.reason).yellow()
            );
        }

        if controller.session().batch().is_empty() {
            eprintln!("{}{}", FAILURE, style("Nothing to upload").red().bold());
            return Ok(ExitCode::FAILURE);
        }

        if controller.is_uploading() {
            if !self.captions.is_empty() {
                warn!("Upload started on selection; captions ignored");
            }
        } else {
            self.apply_captions(&mut controller)?;
            controller.start_upload()?;
        }

        let state = Self::follow(&mut controller).await;
        Ok(Self::summarize(&controller, &state, &report))
    }

    fn apply_captions(&self, controller: &mut UploadController) -> Result<()> {
        let accepted = controller.session().batch().len();
        if self.captions.len() > accepted {
            warn!(
                captions = self.captions.len(),
                accepted, "More captions than accepted files; extras ignored"
            );
        }
        for (index, caption) in self.captions.iter().take(accepted).enumerate() {
            controller.set_caption(index, Some(caption.clone()))?;
        }
        Ok(())
    }

    async fn follow(controller: &mut UploadController) -> SessionState {
        let bar = ProgressBar::new(100);
        if let Ok(progress_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            bar.set_style(progress_style.progress_chars("#>-"));
        }
        bar.set_message(controller.labels().please_wait_message.clone());
        bar.enable_steady_tick(Duration::from_millis(100));

        let interrupt = controller.cancellation_token().map(|token| {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Interrupt received");
                    let _ = token.cancel();
                }
            })
        });

        while let Some(state) = controller.drive().await {
            bar.set_position(u64::from(controller.session().percent()));
            if state.is_terminal() {
                break;
            }
        }

        if let Some(interrupt) = interrupt {
            interrupt.abort();
        }
        bar.finish_and_clear();
        controller.state().clone()
    }

    fn summarize(
        controller: &UploadController,
        state: &SessionState,
        report: &ResponseReport,
    ) -> ExitCode {
        let message = controller
            .session()
            .message()
            .map(|message| message.text.clone());

        match state {
            SessionState::Succeeded => {
                println!(
                    "{}{}",
                    SUCCESS,
                    style(message.unwrap_or_default()).green().bold()
                );
            }
            SessionState::Canceled => {
                eprintln!("{}{}", WARNING, style("Upload canceled").yellow().bold());
            }
            _ => {
                eprintln!(
                    "{}{}",
                    FAILURE,
                    style(message.unwrap_or_else(|| state.to_string())).red().bold()
                );
            }
        }

        for file in report.files.lock().iter() {
            println!(
                "  {} {} {}",
                style(&file.field_name).cyan(),
                file.file_name,
                style(file_uploader::validation::format_size(file.size_bytes)).dim()
            );
        }

        if let Some(outcome) = report.outcome.lock().as_ref() {
            if let Some(status_code) = outcome.status_code {
                println!("  {} {}", style("HTTP").dim(), status_code);
            }
            if let Some(error) = &outcome.error {
                eprintln!("  {}", style(error).red());
            }
            if let Some(body) = render_body(&outcome.response) {
                println!("{body}");
            }
        }

        if matches!(state, SessionState::Succeeded) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Response body as printed to stdout
#[must_use]
pub fn render_body(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Empty => None,
        ResponseBody::Json(value) => {
            Some(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
        }
        ResponseBody::Text(text) => Some(text.clone()),
        ResponseBody::Binary(bytes) => Some(format!("<{} bytes>", bytes.len())),
    }
}

/// Keeps the controller's notifications for the summary
#[derive(Debug, Clone, Default)]
struct ResponseReport {
    outcome: Arc<Mutex<Option<UploadOutcome>>>,
    files: Arc<Mutex<Vec<UploadInfo>>>,
}

impl UploadObserver for ResponseReport {
    fn on_api_response(&mut self, outcome: &UploadOutcome) {
        *self.outcome.lock() = Some(outcome.clone());
    }

    fn on_all_done(&mut self, files: &[UploadInfo]) {
        *self.files.lock() = files.to_vec();
    }
}

//! Logging setup
//!
//! The library only emits `tracing` events. Hosts that do not install their
//! own subscriber can call [`init`] (or [`init_with`]) once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used in debug builds when `RUST_LOG` is unset
pub const DEBUG_FILTER: &str = "debug,file_uploader=trace";

/// Filter used in release builds when `RUST_LOG` is unset
pub const RELEASE_FILTER: &str = "info";

/// Initialize logging with defaults for the current build profile
///
/// Sets up:
/// - Pretty formatting in debug builds, JSON in release builds
/// - Environment-based log level filtering (`RUST_LOG`)
/// - Output on stderr, leaving stdout to the host
///
/// # Example
///
/// ```rust,no_run
/// use file_uploader::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Uploader started");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> anyhow::Result<()> {
    init_with(&ObservabilityConfig::default())
}

/// Initialize logging from an explicit configuration
///
/// `RUST_LOG` still wins over the configured filter.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already installed.
pub fn init_with(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter())?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()?;
    }

    tracing::debug!(service = %config.service_name, "Logging initialized");
    Ok(())
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Filter directive used when `RUST_LOG` is unset
    pub filter: Option<String>,

    /// Emit JSON lines instead of pretty output
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "file-uploader".to_string(),
            filter: None,
            json: !cfg!(debug_assertions),
        }
    }
}

impl ObservabilityConfig {
    /// Config for the named service with profile defaults
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Override the default filter directive
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Force JSON or pretty output regardless of build profile
    #[must_use]
    pub const fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Effective filter directive
    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(if cfg!(debug_assertions) {
            DEBUG_FILTER
        } else {
            RELEASE_FILTER
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "file-uploader");
        assert!(config.filter.is_none());
        assert_eq!(config.json, !cfg!(debug_assertions));
    }

    #[test]
    fn test_builder() {
        let config = ObservabilityConfig::new("uploader-cli")
            .with_filter("warn")
            .with_json(true);

        assert_eq!(config.service_name, "uploader-cli");
        assert_eq!(config.filter(), "warn");
        assert!(config.json);
    }
}

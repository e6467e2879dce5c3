//! Upload configuration
//!
//! A [`UploadConfiguration`] is supplied by the host and treated as read-only
//! by the core. It can be built in code or loaded from multiple sources with
//! clear precedence:
//!
//! 1. Environment variables (highest priority, `UPLOADER_` prefix, `__` for nesting)
//! 2. `./uploader.toml` (development)
//! 3. `~/.config/file-uploader/{service}/config.toml` (user config, XDG)
//! 4. `/etc/file-uploader/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! Every load path validates the result, so a missing endpoint fails fast
//! instead of silently defaulting.
//!
//! # Example Configuration
//!
//! ```toml
//! endpoint_url = "https://files.example.com/upload"
//! http_method = "POST"
//! max_file_size_bytes = 5120000
//! allowed_extensions = ".jpg,.png,.pdf"
//! multiple = true
//! use_indexed_field_names = true
//! response_type = "json"
//!
//! [headers]
//! Authorization = "Bearer abc"
//!
//! [query_params]
//! tags = ["invoice", "2024"]
//!
//! [label_overrides]
//! after_upload_success = "All done!"
//! ```
//!
//! # Usage
//!
//! ```rust
//! use file_uploader::config::UploadConfiguration;
//!
//! # fn example() -> Result<(), file_uploader::config::ConfigError> {
//! let config = UploadConfiguration::builder()
//!     .endpoint_url("https://files.example.com/upload")
//!     .max_file_size_mb(5)
//!     .allowed_extensions(".png,.jpg")
//!     .multiple(true)
//!     .build()?;
//!
//! assert_eq!(config.max_file_size_bytes, 5 * 1_024_000);
//! # Ok(())
//! # }
//! ```

mod labels;

pub use labels::Labels;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes per "MB" as the size limit and the size formatter count them
pub const BYTES_PER_MB: u64 = 1_024_000;

/// Default size limit in MB
pub const DEFAULT_MAX_SIZE_MB: u64 = 20;

/// Extensions accepted when the host configures none
pub const DEFAULT_ALLOWED_EXTENSIONS: &str = ".jpg,.png,.pdf,.docx,.txt,.gif,.jpeg";

/// Errors raised while loading or applying a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No upload endpoint was configured
    #[error("Upload endpoint URL is required")]
    MissingEndpoint,

    /// The endpoint is not a usable http(s) URL
    #[error("Invalid endpoint URL {url:?}: {reason}")]
    InvalidEndpoint {
        /// Configured value
        url: String,
        /// Why it was refused
        reason: String,
    },

    /// The size limit must be positive
    #[error("Maximum file size must be greater than zero")]
    InvalidMaxFileSize,

    /// A header name or value cannot be sent over HTTP
    #[error("Invalid header {name:?}: {reason}")]
    InvalidHeader {
        /// Header name as configured
        name: String,
        /// Why it was refused
        reason: String,
    },

    /// A configuration source could not be read or merged
    #[error("Failed to load configuration: {0}")]
    Load(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// HTTP method used for the upload request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[serde(alias = "get")]
    Get,
    /// POST
    #[default]
    #[serde(alias = "post")]
    Post,
    /// PUT
    #[serde(alias = "put")]
    Put,
    /// PATCH
    #[serde(alias = "patch")]
    Patch,
    /// DELETE
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header or query parameter value: a single string or a list
///
/// A list is sent as repeated entries under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single value
    One(String),
    /// Repeated values
    Many(Vec<String>),
}

impl ParamValue {
    /// All values in order
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// How the response body of the upload endpoint is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Parse as JSON
    Json,
    /// Decode as UTF-8 text
    Text,
    /// Keep raw bytes
    Blob,
    /// Keep raw bytes
    #[serde(rename = "arraybuffer")]
    ArrayBuffer,
}

impl std::str::FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            "blob" => Ok(Self::Blob),
            "arraybuffer" => Ok(Self::ArrayBuffer),
            other => Err(format!("unsupported response type: {other}")),
        }
    }
}

/// Visual flavour of the widget
///
/// The core only cares about [`Theme::AttachPin`], which has no upload button
/// and therefore uploads as soon as a selection yields accepted files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    /// Picker plus upload button
    #[default]
    Default,
    /// Drop zone plus upload button
    DragAndDrop,
    /// Paper-clip trigger, uploads immediately
    AttachPin,
}

impl Theme {
    /// Whether selecting files starts the upload without a separate trigger
    #[must_use]
    pub const fn uploads_immediately(self) -> bool {
        matches!(self, Self::AttachPin)
    }
}

/// Presentation switches passed through to the view untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Do not render the progress bar
    pub hide_progress_bar: bool,
    /// Do not render the reset button
    pub hide_reset_button: bool,
    /// Do not render the file picker button
    pub hide_select_button: bool,
}

/// Set of accepted file extensions
///
/// Entries are stored lower-cased without the leading dot. An entry of `"."`
/// (or an empty list item) explicitly allows files without an extension.
/// Deserializes from either a comma-separated string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "ExtensionList", into = "Vec<String>")]
pub struct AllowedExtensions(BTreeSet<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ExtensionList {
    Joined(String),
    Items(Vec<String>),
}

impl From<ExtensionList> for AllowedExtensions {
    fn from(list: ExtensionList) -> Self {
        match list {
            ExtensionList::Joined(joined) => Self::parse(&joined),
            ExtensionList::Items(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl From<AllowedExtensions> for Vec<String> {
    fn from(extensions: AllowedExtensions) -> Self {
        extensions.0.into_iter().collect()
    }
}

impl<'a> FromIterator<&'a str> for AllowedExtensions {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(normalize_extension).collect())
    }
}

impl AllowedExtensions {
    /// Parses a comma-separated list such as `".jpg, .PNG,pdf"`
    ///
    /// Blank segments are skipped; use `"."` to allow extension-less files.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect()
    }

    /// Whether `extension` (already extracted from a file name) is allowed
    #[must_use]
    pub fn contains(&self, extension: &str) -> bool {
        self.0.contains(&extension.to_lowercase())
    }

    /// Whether files without an extension are allowed
    #[must_use]
    pub fn allows_missing(&self) -> bool {
        self.0.contains("")
    }

    /// Normalised entries in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is allowed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('.')
        .unwrap_or(trimmed)
        .to_lowercase()
}

/// Complete uploader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfiguration {
    /// Upload endpoint
    pub endpoint_url: String,

    /// Request method
    pub http_method: HttpMethod,

    /// Extra request headers (authentication goes here)
    pub headers: BTreeMap<String, ParamValue>,

    /// Query string parameters
    pub query_params: BTreeMap<String, ParamValue>,

    /// Response decoding; `None` tries JSON and falls back to text
    pub response_type: Option<ResponseType>,

    /// Per-file size limit in bytes
    pub max_file_size_bytes: u64,

    /// Accepted file extensions
    pub allowed_extensions: AllowedExtensions,

    /// Allow selecting several files and accumulating selections
    pub multiple: bool,

    /// Default multipart field names carry the file index (`file0`, `file1`, ...)
    pub use_indexed_field_names: bool,

    /// Text overrides keyed by [`Labels`] field name
    pub label_overrides: BTreeMap<String, String>,

    /// Widget flavour
    pub theme: Theme,

    /// Presentation switches
    pub display: DisplayOptions,
}

impl Default for UploadConfiguration {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            http_method: HttpMethod::Post,
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            response_type: None,
            max_file_size_bytes: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
            allowed_extensions: AllowedExtensions::parse(DEFAULT_ALLOWED_EXTENSIONS),
            multiple: false,
            use_indexed_field_names: true,
            label_overrides: BTreeMap::new(),
            theme: Theme::Default,
            display: DisplayOptions::default(),
        }
    }
}

impl UploadConfiguration {
    /// Creates a configuration builder
    #[must_use]
    pub fn builder() -> UploadConfigurationBuilder {
        UploadConfigurationBuilder::new()
    }

    /// Parsed endpoint URL
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEndpoint` when no URL is set and
    /// `ConfigError::InvalidEndpoint` when it is not an absolute http(s) URL.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self.endpoint_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidEndpoint {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                url: raw.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        Ok(url)
    }

    /// Checks everything that would otherwise fail at upload time
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::InvalidMaxFileSize);
        }

        for (name, value) in &self.headers {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            for item in value.values() {
                http::HeaderValue::from_str(item).map_err(|e| ConfigError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        Ok(())
    }

    /// Texts with defaults for the current selection mode plus overrides
    #[must_use]
    pub fn labels(&self) -> Labels {
        Labels::resolve(self.multiple, &self.label_overrides)
    }

    /// Whether a non-empty selection starts the upload by itself
    #[must_use]
    pub const fn uploads_immediately(&self) -> bool {
        self.theme.uploads_immediately()
    }

    /// Load configuration for a specific service
    ///
    /// Searches for configuration in XDG-compliant locations with precedence:
    /// 1. Environment variables (`UPLOADER_*`, use `__` for nesting)
    /// 2. `./uploader.toml`
    /// 3. `~/.config/file-uploader/{service_name}/config.toml`
    /// 4. `/etc/file-uploader/{service_name}/config.toml`
    /// 5. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged result
    /// fails [`validate`](Self::validate).
    pub fn load_for_service(service_name: &str) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let system_config = PathBuf::from("/etc/file-uploader")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./uploader.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        figment = figment.merge(Env::prefixed("UPLOADER_").split("__").lowercase(true));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file over the defaults
    ///
    /// Environment variables still override the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result fails
    /// [`validate`](Self::validate).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::extract_from(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a file over the defaults without validating the result
    ///
    /// For hosts that layer their own overrides (command-line flags, say) on
    /// top and call [`validate`](Self::validate) afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or an `UPLOADER_` variable cannot be
    /// parsed.
    pub fn extract_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("UPLOADER_").split("__").lowercase(true))
            .extract()?)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// # Example
    ///
    /// ```rust
    /// use file_uploader::config::UploadConfiguration;
    ///
    /// let path = UploadConfiguration::recommended_path("my-app");
    /// assert!(path.ends_with("config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./uploader.toml"),
            |config_dir| {
                config_dir
                    .join("file-uploader")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }
}

/// Builder for [`UploadConfiguration`]
///
/// # Examples
///
/// ```rust
/// use file_uploader::config::{HttpMethod, UploadConfigurationBuilder};
///
/// let config = UploadConfigurationBuilder::new()
///     .endpoint_url("https://example.com/upload")
///     .http_method(HttpMethod::Put)
///     .header("Authorization", "Bearer token")
///     .query_param("folder", "inbox")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.http_method, HttpMethod::Put);
/// ```
#[derive(Debug, Default)]
pub struct UploadConfigurationBuilder {
    config: UploadConfiguration,
}

impl UploadConfigurationBuilder {
    /// Starts from the defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upload endpoint
    #[must_use]
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = url.into();
        self
    }

    /// Sets the request method
    #[must_use]
    pub const fn http_method(mut self, method: HttpMethod) -> Self {
        self.config.http_method = method;
        self
    }

    /// Adds a request header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a query parameter
    #[must_use]
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.config.query_params.insert(name.into(), value.into());
        self
    }

    /// Sets how the response body is decoded
    #[must_use]
    pub const fn response_type(mut self, response_type: ResponseType) -> Self {
        self.config.response_type = Some(response_type);
        self
    }

    /// Sets the per-file size limit in bytes
    #[must_use]
    pub const fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    /// Sets the per-file size limit in MB of 1,024,000 bytes
    #[must_use]
    pub const fn max_file_size_mb(mut self, mb: u64) -> Self {
        self.config.max_file_size_bytes = mb.saturating_mul(BYTES_PER_MB);
        self
    }

    /// Sets the accepted extensions from a comma-separated list
    #[must_use]
    pub fn allowed_extensions(mut self, list: &str) -> Self {
        self.config.allowed_extensions = AllowedExtensions::parse(list);
        self
    }

    /// Allows multiple files per selection
    #[must_use]
    pub const fn multiple(mut self, multiple: bool) -> Self {
        self.config.multiple = multiple;
        self
    }

    /// Embeds the file index in default field names
    #[must_use]
    pub const fn use_indexed_field_names(mut self, indexed: bool) -> Self {
        self.config.use_indexed_field_names = indexed;
        self
    }

    /// Overrides one label
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.config.label_overrides.insert(key.into(), text.into());
        self
    }

    /// Sets the widget flavour
    #[must_use]
    pub const fn theme(mut self, theme: Theme) -> Self {
        self.config.theme = theme;
        self
    }

    /// Sets presentation switches
    #[must_use]
    pub const fn display(mut self, display: DisplayOptions) -> Self {
        self.config.display = display;
        self
    }

    /// Validates and returns the configuration
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is unusable.
    pub fn build(self) -> Result<UploadConfiguration, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

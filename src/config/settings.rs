//! Analyzer settings and configuration management.
//!
//! Settings come from several sources with fixed precedence; see
//! [`AnalyzerSettings`].

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::{parse_filters, Category};
use crate::detection::InterceptionSettings;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "PRIVACY_ANALYZER_";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// Analyzer settings.
///
/// # Configuration Precedence
///
/// Settings are applied in the following order (later sources override earlier):
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables (`PRIVACY_ANALYZER_*`)
/// 4. CLI arguments
///
/// # Example
///
/// ```rust
/// use privacy_analyzer::config::AnalyzerSettings;
///
/// let settings = AnalyzerSettings::default()
///     .with_timeout(10_000)
///     .with_display_limit(25);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Page fetch timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// User agent sent when fetching pages.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of redirects followed.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Number of third-party domains printed before collapsing.
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,

    /// Filter list used when none is given on the command line.
    #[serde(default = "default_filter")]
    pub default_filter: String,

    /// Delay before a created canvas is inspected, in milliseconds.
    #[serde(default = "default_canvas_watch_delay_ms")]
    pub canvas_watch_delay_ms: u64,

    /// Pretty-print JSON printed on stdout. Report files are always pretty.
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

// Default value functions for serde
fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_user_agent() -> String {
    format!("privacy-analyzer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_redirects() -> usize {
    10
}

fn default_display_limit() -> usize {
    10
}

fn default_filter() -> String {
    "all".to_string()
}

fn default_canvas_watch_delay_ms() -> u64 {
    1000
}

fn default_pretty_json() -> bool {
    true
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            display_limit: default_display_limit(),
            default_filter: default_filter(),
            canvas_watch_delay_ms: default_canvas_watch_delay_ms(),
            pretty_json: default_pretty_json(),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl AnalyzerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a configuration file.
    ///
    /// Supports both TOML and JSON formats, detected by file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        match file_extension(path).as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Saves settings to a configuration file, format chosen by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = match file_extension(path).as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Loads defaults with environment variable overrides applied.
    ///
    /// Variables use the `PRIVACY_ANALYZER_` prefix, e.g.
    /// `PRIVACY_ANALYZER_REQUEST_TIMEOUT_MS` or `PRIVACY_ANALYZER_PRETTY_JSON`.
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Merges current settings with environment variable overrides.
    pub fn merge_with_env(mut self) -> Self {
        self.apply_overrides(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok());
        self
    }

    /// Applies overrides from `lookup`, keyed by the unprefixed variable name.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup("REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.request_timeout_ms = timeout;
        }

        if let Some(val) = lookup("USER_AGENT") {
            self.user_agent = val;
        }

        if let Some(max) = lookup("MAX_REDIRECTS").and_then(|v| v.parse().ok()) {
            self.max_redirects = max;
        }

        if let Some(limit) = lookup("DISPLAY_LIMIT").and_then(|v| v.parse().ok()) {
            self.display_limit = limit;
        }

        if let Some(val) = lookup("DEFAULT_FILTER") {
            self.default_filter = val;
        }

        if let Some(delay) = lookup("CANVAS_WATCH_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.canvas_watch_delay_ms = delay;
        }

        if let Some(val) = lookup("PRETTY_JSON") {
            self.pretty_json = parse_bool(&val);
        }
    }

    /// Merges settings with CLI arguments.
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(timeout) = args.timeout_ms {
            self.request_timeout_ms = timeout;
        }
        if let Some(ref user_agent) = args.user_agent {
            self.user_agent = user_agent.clone();
        }
        if let Some(max) = args.max_redirects {
            self.max_redirects = max;
        }
        if let Some(limit) = args.display_limit {
            self.display_limit = limit;
        }
        if let Some(pretty) = args.pretty_json {
            self.pretty_json = pretty;
        }
        self
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms < 1000 {
            return Err(ConfigError::ValidationError(
                "Request timeout must be at least 1000ms".to_string(),
            ));
        }
        if self.request_timeout_ms > 300000 {
            return Err(ConfigError::ValidationError(
                "Request timeout cannot exceed 300000ms (5 minutes)".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "User agent cannot be empty".to_string(),
            ));
        }

        if self.max_redirects > 20 {
            return Err(ConfigError::ValidationError(
                "Maximum redirects cannot exceed 20".to_string(),
            ));
        }

        if self.display_limit == 0 {
            return Err(ConfigError::ValidationError(
                "Display limit must be at least 1".to_string(),
            ));
        }

        if self.canvas_watch_delay_ms > 60000 {
            return Err(ConfigError::ValidationError(
                "Canvas watch delay cannot exceed 60000ms".to_string(),
            ));
        }

        self.default_categories()?;
        Ok(())
    }

    /// Parses [`default_filter`](Self::default_filter).
    pub fn default_categories(&self) -> Result<Vec<Category>, ConfigError> {
        let categories = parse_filters(&self.default_filter)
            .map_err(|e| ConfigError::ValidationError(format!("default_filter: {}", e)))?;
        if categories.is_empty() {
            return Err(ConfigError::ValidationError(
                "default_filter must name at least one category".to_string(),
            ));
        }
        Ok(categories)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn canvas_watch_delay(&self) -> Duration {
        Duration::from_millis(self.canvas_watch_delay_ms)
    }

    // Builder-style methods for convenient configuration

    /// Sets the request timeout in milliseconds.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn with_display_limit(mut self, limit: usize) -> Self {
        self.display_limit = limit;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_canvas_watch_delay(mut self, delay_ms: u64) -> Self {
        self.canvas_watch_delay_ms = delay_ms;
        self
    }

    pub fn with_pretty_json(mut self, pretty: bool) -> Self {
        self.pretty_json = pretty;
        self
    }
}

impl From<&AnalyzerSettings> for InterceptionSettings {
    fn from(settings: &AnalyzerSettings) -> Self {
        InterceptionSettings::default().with_watch_delay(settings.canvas_watch_delay())
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// CLI overrides. All fields are optional to allow partial overrides.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Custom user agent string.
    pub user_agent: Option<String>,
    /// Maximum redirects.
    pub max_redirects: Option<usize>,
    /// Display limit for domain lists.
    pub display_limit: Option<usize>,
    /// Pretty-print JSON output.
    pub pretty_json: Option<bool>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final settings by applying the full configuration chain.
    ///
    /// ```rust,no_run
    /// use privacy_analyzer::config::CliArgs;
    ///
    /// let args = CliArgs {
    ///     config_file: Some("analyzer.toml".into()),
    ///     timeout_ms: Some(5000),
    ///     ..Default::default()
    /// };
    ///
    /// let settings = args.load_settings().unwrap();
    /// ```
    pub fn load_settings(&self) -> Result<AnalyzerSettings, ConfigError> {
        let settings = match self.config_file {
            Some(ref config_file) => AnalyzerSettings::from_file(config_file)?,
            None => AnalyzerSettings::default(),
        };

        let settings = settings.merge_with_env().merge_with_args(self);
        settings.validate()?;

        Ok(settings)
    }
}

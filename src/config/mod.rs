//! Configuration module for privacy-analyzer.
//!
//! This module provides configuration management for the analyzer, including:
//! - Loading settings from files (TOML/JSON)
//! - Environment variable overrides
//! - CLI argument overrides
//! - Validation and defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use privacy_analyzer::config::AnalyzerSettings;
//!
//! let settings = AnalyzerSettings::from_file("analyzer.toml")
//!     .unwrap()
//!     .merge_with_env();
//! ```

mod settings;

pub use settings::{AnalyzerSettings, CliArgs, ConfigError, ENV_PREFIX};

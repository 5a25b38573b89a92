//! # Privacy Analyzer
//!
//! Local-first, heuristic privacy analysis of web pages.
//!
//! Privacy Analyzer inspects a page's HTML and inline scripts and reports the
//! signals a non-expert user cares about: scripts loaded from third-party
//! domains, dangerous dynamic-code execution (`eval` and friends), and use of
//! browser APIs commonly abused for fingerprinting, including live canvas
//! reads observed at runtime.
//!
//! ## Features
//!
//! - **Detection Engine**: Pure, deterministic classifiers and scanners
//! - **Page Analysis**: Works on fetched HTML or on a live document
//! - **Canvas Interception**: Decorator over live canvas capabilities plus the
//!   equivalent injectable page script
//! - **Extension Layer**: Typed runtime messages, per-tab report log, popup view
//! - **Reports**: JSON reports with derived summaries, filtering and export
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust
//! use privacy_analyzer::analysis::PageAnalyzer;
//!
//! let html = r#"<script src="https://cdn.example.net/lib.js"></script>
//!               <script>eval("evil")</script>"#;
//!
//! let report = PageAnalyzer::new()
//!     .analyze_html("https://example.com/", html)
//!     .unwrap();
//!
//! assert_eq!(report.third_party_domains(), ["cdn.example.net"]);
//! assert_eq!(report.summary().total_eval_patterns, 1);
//! ```
//!
//! ## Module Overview
//!
//! - [`detection`]: Domain classification, pattern scanning, fingerprinting detection
//! - [`analysis`]: Page-level orchestration and category filtering
//! - [`report`]: Report schema, export shaping, filenames
//! - [`extension`]: Content script, background service, popup model
//! - [`browser`]: Live-document access
//! - [`fetch`]: Page fetching for the CLI
//! - [`config`]: Configuration loading and management
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Privacy Analyzer                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │     ┌─────────┐                          ┌───────────┐          │
//! │     │   CLI   │                          │ Extension │          │
//! │     │ (fetch) │                          │   layer   │          │
//! │     └────┬────┘                          └─────┬─────┘          │
//! │          └──────────────┬──────────────────────┘                │
//! │                  ┌──────┴──────┐     ┌──────────┐               │
//! │                  │  Analysis   │────▶│  Report  │               │
//! │                  └──────┬──────┘     └──────────┘               │
//! │                  ┌──────┴──────┐                                │
//! │                  │  Detection  │                                │
//! │                  └─────────────┘                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`PRIVACY_ANALYZER_*`)
//! 4. CLI arguments
//!
//! See [`config::AnalyzerSettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Injectable time source.
pub mod clock;

/// The detection engine: domains, dangerous patterns, fingerprinting.
pub mod detection;

/// Page analysis orchestration and report filtering.
pub mod analysis;

/// Report schema, export shaping and filenames.
pub mod report;

/// Live-document access for in-browser analysis.
pub mod browser;

/// Extension contexts: content script, background service, popup.
pub mod extension;

/// HTTP page fetching for the command line.
pub mod fetch;

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Detection types
pub use detection::{
    CanvasApi, CanvasInterceptionEvent, CanvasMethod, DangerousPatternMatch, FingerprintSignal,
    InterceptedCanvasApi, InterceptionSettings,
};

// Analysis types
pub use analysis::{AnalysisError, Category, PageAnalyzer};

// Report types
pub use report::{AnalysisReport, BrowserInfo, ExportReport, ReportBuilder, Summary};

// Browser types
pub use browser::{DomAccessor, DomElement, MockDomAccessor};

// Extension types
pub use extension::{
    BackgroundService, ContentScript, ExtensionMessage, MessageChannel, MessageSender,
    TabReportStore,
};

// Fetch types
pub use fetch::{FetchError, PageFetcher};

// Config types
pub use config::{AnalyzerSettings, CliArgs, ConfigError};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use privacy_analyzer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::analysis::{filter_report, parse_filters, Category, PageAnalyzer};
    pub use crate::config::{AnalyzerSettings, CliArgs};
    pub use crate::detection::{FingerprintSignal, InterceptionSettings};
    pub use crate::extension::{BackgroundService, ContentScript, MessageChannel};
    pub use crate::report::{AnalysisReport, ReportBuilder};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

//! Page analysis orchestration.
//!
//! [`PageAnalyzer`] runs the detection engine over a page, either from an
//! HTML string or from a live document behind a
//! [`DomAccessor`](crate::browser::DomAccessor), and aggregates the results
//! into an [`AnalysisReport`](crate::report::AnalysisReport). Category
//! filtering of finished reports lives in [`filter`].

pub mod filter;
pub mod page;

use thiserror::Error;

pub use filter::{filter_report, parse_filters, Category};
pub use page::{extract_scripts, AnalysisTarget, PageAnalyzer, ScriptReference};

/// Errors from analyzing a page or interpreting analysis options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The page URL is not a parseable absolute URL.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A filter token is not a known category.
    #[error("Invalid filter type: {token}. Valid types: {}", filter::VALID_FILTERS)]
    InvalidFilter { token: String },

    /// The live document could not be queried.
    #[error("Document access failed: {0}")]
    Document(String),
}

//! Category filtering of analysis reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::report::AnalysisReport;

/// Tokens accepted by [`parse_filters`].
pub const VALID_FILTERS: &str = "trackers, eval, fingerprinting, all";

/// A report category that can be selected for display or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Third-party script domains.
    Trackers,
    /// Dangerous dynamic-code patterns in inline scripts.
    Eval,
    /// Fingerprinting APIs, including live canvas detections.
    Fingerprinting,
}

impl Category {
    /// Every category, in the order `all` expands to.
    pub const ALL: [Category; 3] = [Category::Trackers, Category::Eval, Category::Fingerprinting];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Trackers => "trackers",
            Category::Eval => "eval",
            Category::Fingerprinting => "fingerprinting",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trackers" => Ok(Category::Trackers),
            "eval" => Ok(Category::Eval),
            "fingerprinting" => Ok(Category::Fingerprinting),
            other => Err(AnalysisError::InvalidFilter {
                token: other.to_string(),
            }),
        }
    }
}

/// Parses a comma-separated filter list.
///
/// Tokens are trimmed, empty tokens are ignored and duplicates collapse to
/// their first occurrence. `all` expands to every category in
/// [`Category::ALL`] order.
///
/// # Errors
///
/// Returns [`AnalysisError::InvalidFilter`] naming the first unknown token.
pub fn parse_filters(input: &str) -> Result<Vec<Category>, AnalysisError> {
    let mut categories = Vec::new();

    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let expanded: Vec<Category> = if token == "all" {
            Category::ALL.to_vec()
        } else {
            vec![token.parse()?]
        };

        for category in expanded {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
    }

    Ok(categories)
}

/// Returns a copy of `report` keeping only the selected categories.
///
/// Unselected categories are emptied and the summary recomputed; canvas
/// detections follow [`Category::Fingerprinting`].
pub fn filter_report(report: &AnalysisReport, categories: &[Category]) -> AnalysisReport {
    let keep = |category: Category| categories.contains(&category);

    let mut filtered = AnalysisReport::new(report.url(), report.timestamp());
    if keep(Category::Trackers) {
        filtered = filtered.with_third_party_domains(report.third_party_domains().to_vec());
    }
    if keep(Category::Eval) {
        filtered = filtered.with_inline_eval_patterns(report.inline_eval_patterns().to_vec());
    }
    if keep(Category::Fingerprinting) {
        filtered = filtered
            .with_fingerprinting_apis(report.fingerprinting_apis().to_vec())
            .with_canvas_detections(report.canvas_detections().to_vec());
    }
    filtered
}

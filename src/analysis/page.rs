//! Page-level orchestration of the detection engine.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use super::AnalysisError;
use crate::browser::dom::{DomAccessor, CANVASES, EXTERNAL_SCRIPTS, INLINE_SCRIPTS};
use crate::clock::{Clock, SystemClock};
use crate::detection::{detect_static, scan_code, third_party_domains};
use crate::report::{AnalysisReport, InlineScriptFinding};

static EXTERNAL_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<script[^>]+src=["']([^"']+)["']"#).expect("valid regex"));

static SCRIPT_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("valid regex"));

static SRC_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)src=").expect("valid regex"));

static CANVAS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<canvas\b").expect("valid regex"));

/// The page being analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTarget {
    raw: String,
    url: Url,
}

impl AnalysisTarget {
    /// Parses an absolute page URL.
    pub fn parse(page_url: &str) -> Result<Self, AnalysisError> {
        Url::parse(page_url)
            .map(|url| Self {
                raw: page_url.to_string(),
                url,
            })
            .map_err(|e| AnalysisError::InvalidUrl {
                url: page_url.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL exactly as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The page host, empty for host-less URLs.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// One `<script>` element of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReference {
    /// A script loaded from `raw_src`, exactly as written in the document.
    External { raw_src: String },
    /// An inline script; `ordinal_index` counts inline scripts only.
    Inline { body: String, ordinal_index: usize },
}

/// Extracts script references from `html` in document order.
///
/// Extraction is regex-based, not an HTML parser: scripts inside comments or
/// CDATA are still reported.
pub fn extract_scripts(html: &str) -> Vec<ScriptReference> {
    let mut found: Vec<(usize, ScriptReference)> = EXTERNAL_SCRIPT
        .captures_iter(html)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let raw_src = caps.get(1)?.as_str().to_string();
            Some((start, ScriptReference::External { raw_src }))
        })
        .collect();

    let inline = SCRIPT_ELEMENT
        .captures_iter(html)
        .filter(|caps| !caps.get(1).map_or(false, |attrs| SRC_ATTRIBUTE.is_match(attrs.as_str())))
        .enumerate()
        .filter_map(|(ordinal_index, caps)| {
            let start = caps.get(0)?.start();
            let body = caps.get(2).map_or("", |m| m.as_str()).to_string();
            Some((start, ScriptReference::Inline { body, ordinal_index }))
        });
    found.extend(inline);

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, script)| script).collect()
}

/// Counts `<canvas` tags in `html`.
pub fn count_canvas_tags(html: &str) -> usize {
    CANVAS_TAG.find_iter(html).count()
}

/// Runs the detection engine over a page and aggregates the results.
pub struct PageAnalyzer {
    clock: Arc<dyn Clock>,
}

impl Default for PageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageAnalyzer {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to timestamp reports.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Analyzes a fetched HTML document served from `page_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidUrl`] if `page_url` is not an absolute
    /// URL.
    pub fn analyze_html(&self, page_url: &str, html: &str) -> Result<AnalysisReport, AnalysisError> {
        let target = AnalysisTarget::parse(page_url)?;
        info!("Analyzing {} ({} bytes of HTML)", page_url, html.len());

        let scripts = extract_scripts(html);
        let report = self.analyze_scripts(&target, &scripts, count_canvas_tags(html));
        Ok(report)
    }

    /// Analyzes the live document behind `accessor`.
    pub async fn analyze_document(
        &self,
        accessor: &dyn DomAccessor,
    ) -> Result<AnalysisReport, AnalysisError> {
        let location = accessor.location().await.map_err(document_error)?;
        let target = AnalysisTarget::parse(&location)?;
        info!("Analyzing live document {}", location);

        let mut scripts: Vec<ScriptReference> = accessor
            .find_elements(EXTERNAL_SCRIPTS)
            .await
            .map_err(document_error)?
            .into_iter()
            .filter_map(|element| element.src().cloned())
            .map(|raw_src| ScriptReference::External { raw_src })
            .collect();

        let inline = accessor
            .find_elements(INLINE_SCRIPTS)
            .await
            .map_err(document_error)?;
        scripts.extend(
            inline
                .into_iter()
                .enumerate()
                .map(|(ordinal_index, element)| ScriptReference::Inline {
                    body: element.text_content,
                    ordinal_index,
                }),
        );

        let canvas_count = accessor
            .find_elements(CANVASES)
            .await
            .map_err(document_error)?
            .len();

        Ok(self.analyze_scripts(&target, &scripts, canvas_count))
    }

    /// Aggregates detections over already-extracted scripts.
    pub fn analyze_scripts(
        &self,
        target: &AnalysisTarget,
        scripts: &[ScriptReference],
        canvas_count: usize,
    ) -> AnalysisReport {
        let mut srcs = Vec::new();
        let mut bodies = Vec::new();
        let mut findings = Vec::new();

        for script in scripts {
            match script {
                ScriptReference::External { raw_src } => srcs.push(raw_src.as_str()),
                ScriptReference::Inline { body, ordinal_index } => {
                    let patterns = scan_code(body);
                    if !patterns.is_empty() {
                        debug!(
                            "Inline script #{}: {} dangerous pattern(s)",
                            ordinal_index,
                            patterns.len()
                        );
                        findings.push(InlineScriptFinding {
                            index: *ordinal_index,
                            patterns,
                        });
                    }
                    bodies.push(body.as_str());
                }
            }
        }

        let domains = third_party_domains(target.url(), srcs);
        let signals = detect_static(bodies, canvas_count);

        let report = AnalysisReport::new(target.as_str(), self.clock.now())
            .with_third_party_domains(domains)
            .with_inline_eval_patterns(findings)
            .with_fingerprinting_apis(signals);

        info!(
            "Analysis of {} complete: {} third-party domain(s), {} script(s) with eval patterns, {} fingerprinting API(s)",
            target.host(),
            report.summary().total_third_party_domains,
            report.summary().total_eval_patterns,
            report.summary().total_fingerprinting_apis
        );
        report
    }
}

fn document_error(e: anyhow::Error) -> AnalysisError {
    AnalysisError::Document(format!("{:#}", e))
}

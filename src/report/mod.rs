//! Report schema and export shaping.
//!
//! [`AnalysisReport`] is the single result type produced by the analyzer and
//! exchanged with the extension layer. Its [`Summary`] is always derived from
//! the report's arrays: it is recomputed whenever a report is constructed or
//! deserialized, so a report can never carry inconsistent counts.
//!
//! [`ReportBuilder`] shapes the latest tab report into an [`ExportReport`]
//! with browser and extension metadata; [`export_filename`] names the file.

pub mod timestamp;

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::detection::{CanvasInterceptionEvent, DangerousPatternMatch, FingerprintSignal};

/// Placeholder for unknown export metadata.
pub const UNKNOWN: &str = "Unknown";

/// Dangerous patterns found in one inline script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineScriptFinding {
    /// Zero-based position among inline scripts in document order.
    pub index: usize,

    #[serde(default)]
    pub patterns: Vec<DangerousPatternMatch>,
}

/// Derived counts over an [`AnalysisReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_third_party_domains: usize,

    /// Number of inline scripts with at least one finding.
    pub total_eval_patterns: usize,

    #[serde(rename = "totalFingerprintingAPIs")]
    pub total_fingerprinting_apis: usize,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_canvas_detections: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// The analysis result for one page.
///
/// Fields are read through accessors; `with_*` methods return a new report
/// with the summary recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawReport")]
pub struct AnalysisReport {
    url: String,
    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
    third_party_domains: Vec<String>,
    inline_eval_patterns: Vec<InlineScriptFinding>,
    #[serde(rename = "fingerprintingAPIs")]
    fingerprinting_apis: Vec<FingerprintSignal>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    canvas_detections: Vec<CanvasInterceptionEvent>,
    summary: Summary,
}

/// Wire form accepted on input; optional arrays default to empty and any
/// incoming summary is discarded.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default)]
    url: String,
    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    third_party_domains: Vec<String>,
    #[serde(default)]
    inline_eval_patterns: Vec<InlineEvalEntry>,
    #[serde(default, rename = "fingerprintingAPIs")]
    fingerprinting_apis: Vec<FingerprintSignal>,
    #[serde(default)]
    canvas_detections: Vec<CanvasInterceptionEvent>,
}

/// One `inlineEvalPatterns` element on input: a per-script finding, or a
/// bare pattern match as sent by flattening producers.
#[derive(Deserialize)]
#[serde(untagged)]
enum InlineEvalEntry {
    Finding(InlineScriptFinding),
    Match(DangerousPatternMatch),
}

/// Folds each run of consecutive bare matches into one finding indexed by
/// its position in the list.
fn group_inline_entries(entries: Vec<InlineEvalEntry>) -> Vec<InlineScriptFinding> {
    let mut findings: Vec<InlineScriptFinding> = Vec::new();
    let mut in_flat_run = false;

    for entry in entries {
        match entry {
            InlineEvalEntry::Finding(finding) => {
                findings.push(finding);
                in_flat_run = false;
            }
            InlineEvalEntry::Match(m) => match findings.last_mut() {
                Some(last) if in_flat_run => last.patterns.push(m),
                _ => {
                    let index = findings.len();
                    findings.push(InlineScriptFinding {
                        index,
                        patterns: vec![m],
                    });
                    in_flat_run = true;
                }
            },
        }
    }
    findings
}

impl From<RawReport> for AnalysisReport {
    fn from(raw: RawReport) -> Self {
        AnalysisReport::new(raw.url, raw.timestamp)
            .with_third_party_domains(raw.third_party_domains)
            .with_inline_eval_patterns(group_inline_entries(raw.inline_eval_patterns))
            .with_fingerprinting_apis(raw.fingerprinting_apis)
            .with_canvas_detections(raw.canvas_detections)
    }
}

impl AnalysisReport {
    /// Creates an empty report for `url` observed at `timestamp`.
    pub fn new(url: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            timestamp,
            third_party_domains: Vec::new(),
            inline_eval_patterns: Vec::new(),
            fingerprinting_apis: Vec::new(),
            canvas_detections: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn with_third_party_domains(mut self, domains: Vec<String>) -> Self {
        self.third_party_domains = domains;
        self.refresh_summary()
    }

    pub fn with_inline_eval_patterns(mut self, findings: Vec<InlineScriptFinding>) -> Self {
        self.inline_eval_patterns = findings;
        self.refresh_summary()
    }

    pub fn with_fingerprinting_apis(mut self, signals: Vec<FingerprintSignal>) -> Self {
        self.fingerprinting_apis = signals;
        self.refresh_summary()
    }

    pub fn with_canvas_detections(mut self, detections: Vec<CanvasInterceptionEvent>) -> Self {
        self.canvas_detections = detections;
        self.refresh_summary()
    }

    fn refresh_summary(mut self) -> Self {
        self.summary = Summary {
            total_third_party_domains: self.third_party_domains.len(),
            total_eval_patterns: self.inline_eval_patterns.len(),
            total_fingerprinting_apis: self.fingerprinting_apis.len(),
            total_canvas_detections: self.canvas_detections.len(),
        };
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn third_party_domains(&self) -> &[String] {
        &self.third_party_domains
    }

    pub fn inline_eval_patterns(&self) -> &[InlineScriptFinding] {
        &self.inline_eval_patterns
    }

    pub fn fingerprinting_apis(&self) -> &[FingerprintSignal] {
        &self.fingerprinting_apis
    }

    pub fn canvas_detections(&self) -> &[CanvasInterceptionEvent] {
        &self.canvas_detections
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Total number of individual pattern matches across all inline scripts.
    pub fn total_pattern_matches(&self) -> usize {
        self.inline_eval_patterns.iter().map(|f| f.patterns.len()).sum()
    }

    /// Returns true if the report carries no findings of any kind.
    pub fn is_clean(&self) -> bool {
        self.third_party_domains.is_empty()
            && self.inline_eval_patterns.is_empty()
            && self.fingerprinting_apis.is_empty()
            && self.canvas_detections.is_empty()
    }
}

/// Browser identification included in exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: String,
    pub version: String,
}

impl BrowserInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for BrowserInfo {
    fn default() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }
}

/// An exported report: the latest analysis plus environment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub browser: BrowserInfo,
    pub extension_version: String,
}

/// Builds an [`ExportReport`] from the most recent tab report.
///
/// # Example
///
/// ```rust
/// use privacy_analyzer::extension::TabReportStore;
/// use privacy_analyzer::report::ReportBuilder;
///
/// let store = TabReportStore::new();
/// let export = ReportBuilder::new()
///     .latest(store.get(7).last().cloned())
///     .fallback_url("https://example.com/")
///     .extension_version("1.2.0")
///     .build();
/// assert_eq!(export.report.url(), "https://example.com/");
/// ```
pub struct ReportBuilder {
    latest: Option<AnalysisReport>,
    fallback_url: Option<String>,
    browser: Option<BrowserInfo>,
    extension_version: Option<String>,
    clock: Arc<dyn Clock>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            latest: None,
            fallback_url: None,
            browser: None,
            extension_version: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the report the export is built from.
    pub fn latest(mut self, report: Option<AnalysisReport>) -> Self {
        self.latest = report;
        self
    }

    /// URL used when the latest report has none (e.g. the tab's URL).
    pub fn fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn browser(mut self, browser: BrowserInfo) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn extension_version(mut self, version: impl Into<String>) -> Self {
        self.extension_version = Some(version.into());
        self
    }

    /// Clock used when there is no report to take a timestamp from.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ExportReport {
        let latest = self.latest;
        let latest_url = latest
            .as_ref()
            .map(|r| r.url().to_string())
            .filter(|url| !url.is_empty());
        let url = latest_url
            .or(self.fallback_url.filter(|url| !url.is_empty()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        let report = match latest {
            Some(report) => AnalysisReport {
                url,
                ..report
            },
            None => AnalysisReport::new(url, self.clock.now()),
        };

        ExportReport {
            report,
            browser: self.browser.unwrap_or_default(),
            extension_version: self
                .extension_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// Returns the export filename for `ts`, using the calendar fields of the
/// timestamp's own zone: `privacy-report-YYYY-MM-DD-HHMM.json`.
pub fn export_filename<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("privacy-report-{}.json", ts.format("%Y-%m-%d-%H%M"))
}

/// Returns the export filename for `ts` in the local time zone.
pub fn local_export_filename(ts: DateTime<Utc>) -> String {
    export_filename(&ts.with_timezone(&Local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::detection::CanvasMethod;
    use chrono::FixedOffset;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn sample() -> AnalysisReport {
        AnalysisReport::new("https://example.com/", at(1761145424059))
            .with_third_party_domains(vec!["cdn.example.net".into(), "ads.test".into()])
            .with_inline_eval_patterns(vec![InlineScriptFinding {
                index: 1,
                patterns: crate::detection::scan_code("eval(a); eval(b);"),
            }])
            .with_fingerprinting_apis(vec![FingerprintSignal::CanvasToDataUrl])
    }

    #[test]
    fn test_summary_tracks_arrays() {
        let report = sample();
        assert_eq!(report.summary().total_third_party_domains, 2);
        assert_eq!(report.summary().total_eval_patterns, 1);
        assert_eq!(report.summary().total_fingerprinting_apis, 1);
        assert_eq!(report.summary().total_canvas_detections, 0);
        assert_eq!(report.total_pattern_matches(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["url"], "https://example.com/");
        assert_eq!(value["timestamp"], "2025-10-22T15:03:44.059Z");
        assert_eq!(value["fingerprintingAPIs"][0], "canvas.toDataURL");
        assert_eq!(value["inlineEvalPatterns"][0]["index"], 1);
        assert_eq!(value["summary"]["totalFingerprintingAPIs"], 1);
        assert!(value.get("canvasDetections").is_none());
        assert!(value["summary"].get("totalCanvasDetections").is_none());
    }

    #[test]
    fn test_incoming_summary_is_recomputed() {
        let json = r#"{
            "url": "https://example.com/",
            "timestamp": 1761145424059,
            "thirdPartyDomains": ["a.test", "b.test"],
            "summary": {"totalThirdPartyDomains": 99, "totalEvalPatterns": 7, "totalFingerprintingAPIs": 3}
        }"#;
        let report: AnalysisReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.summary().total_third_party_domains, 2);
        assert_eq!(report.summary().total_eval_patterns, 0);
        assert!(report.inline_eval_patterns().is_empty());
        assert!(report.fingerprinting_apis().is_empty());
    }

    #[test]
    fn test_flat_eval_matches_are_grouped() {
        let json = r#"{
            "url": "https://example.com/",
            "timestamp": 1761145424059,
            "inlineEvalPatterns": [
                {"pattern": "eval", "description": "Direct eval() call", "line": 1, "column": 0, "snippet": "eval(a)"},
                {"pattern": "eval", "description": "Direct eval() call", "line": 2, "column": 4, "snippet": "eval(b)"},
                {"index": 3, "patterns": []},
                {"pattern": "setTimeout with string", "line": 1}
            ]
        }"#;
        let report: AnalysisReport = serde_json::from_str(json).unwrap();

        let findings = report.inline_eval_patterns();
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].index, 0);
        assert_eq!(findings[0].patterns.len(), 2);
        assert_eq!(findings[0].patterns[1].column, 4);
        assert_eq!(findings[1].index, 3);
        assert_eq!(findings[2].index, 2);
        assert_eq!(findings[2].patterns[0].pattern, "setTimeout with string");
        assert_eq!(report.summary().total_eval_patterns, 3);
    }

    #[test]
    fn test_canvas_detections_counted() {
        let report = AnalysisReport::new("https://example.com/", at(0)).with_canvas_detections(vec![
            CanvasInterceptionEvent::new(CanvasMethod::ToDataUrl),
            CanvasInterceptionEvent::new(CanvasMethod::GetImageData),
        ]);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["totalCanvasDetections"], 2);
        assert_eq!(value["canvasDetections"][1]["method"], "getImageData");
    }

    #[test]
    fn test_builder_defaults() {
        let clock = Arc::new(ManualClock::new(at(1_000)));
        let export = ReportBuilder::new().clock(clock).build();

        assert_eq!(export.report.url(), UNKNOWN);
        assert_eq!(export.report.timestamp(), at(1_000));
        assert_eq!(export.browser, BrowserInfo::new("Unknown", "Unknown"));
        assert_eq!(export.extension_version, "Unknown");
        assert!(export.report.is_clean());
    }

    #[test]
    fn test_builder_prefers_latest_then_fallback() {
        let export = ReportBuilder::new()
            .latest(Some(sample()))
            .fallback_url("https://tab.example/")
            .browser(BrowserInfo::new("Chrome", "129"))
            .extension_version("1.2.0")
            .build();
        assert_eq!(export.report.url(), "https://example.com/");
        assert_eq!(export.report.timestamp(), at(1761145424059));
        assert_eq!(export.report.summary().total_third_party_domains, 2);

        let no_url = AnalysisReport::new("", at(5));
        let export = ReportBuilder::new()
            .latest(Some(no_url))
            .fallback_url("https://tab.example/")
            .build();
        assert_eq!(export.report.url(), "https://tab.example/");
    }

    #[test]
    fn test_export_json_flattens_report() {
        let export = ReportBuilder::new()
            .latest(Some(sample()))
            .extension_version("1.2.0")
            .build();
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["url"], "https://example.com/");
        assert_eq!(value["extensionVersion"], "1.2.0");
        assert_eq!(value["browser"]["name"], "Unknown");
        assert_eq!(value["summary"]["totalThirdPartyDomains"], 2);

        let parsed: ExportReport = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, export);
    }

    #[test]
    fn test_export_filename_uses_zone_fields() {
        let ts = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 5, 9, 7, 0)
            .unwrap();
        assert_eq!(export_filename(&ts), "privacy-report-2025-01-05-0907.json");

        let utc = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(export_filename(&utc), "privacy-report-2025-12-31-2359.json");
    }

    #[test]
    fn test_local_export_filename_format() {
        let name = local_export_filename(at(1761145424059));
        assert!(name.starts_with("privacy-report-"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "privacy-report-2025-10-22-1503.json".len());
    }
}

//! Per-tab append-only report log.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use privacy_analyzer::extension::store::{EntryKind, TabReportStore};
//! use privacy_analyzer::report::AnalysisReport;
//!
//! let store = TabReportStore::new();
//! let report = AnalysisReport::new("https://example.com/", Utc::now());
//! store.append(7, EntryKind::PageReport, report);
//! assert_eq!(store.get(7).len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::messages::TabId;
use crate::clock::{Clock, SystemClock};
use crate::report::AnalysisReport;

/// How an entry reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A full page analysis.
    PageReport,
    /// A single live canvas observation.
    CanvasOnly,
}

/// One recorded report.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Store-wide, strictly increasing arrival number.
    pub sequence: u64,

    /// When the store received the entry.
    pub received_at: DateTime<Utc>,

    pub kind: EntryKind,

    pub report: AnalysisReport,
}

/// Thread-safe map from tab to its entries in arrival order.
pub struct TabReportStore {
    tabs: RwLock<HashMap<TabId, Vec<StoredEntry>>>,
    next_sequence: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for TabReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TabReportStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tabs: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            clock,
        }
    }

    /// The clock used to stamp entries.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Appends `report` to the log of `tab_id` and returns its sequence.
    pub fn append(&self, tab_id: TabId, kind: EntryKind, report: AnalysisReport) -> u64 {
        let mut tabs = self.tabs.write();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        tabs.entry(tab_id).or_default().push(StoredEntry {
            sequence,
            received_at: self.clock.now(),
            kind,
            report,
        });
        sequence
    }

    /// Reports recorded for `tab_id`, oldest first. Empty for unknown tabs.
    pub fn get(&self, tab_id: TabId) -> Vec<AnalysisReport> {
        self.tabs
            .read()
            .get(&tab_id)
            .map(|entries| entries.iter().map(|e| e.report.clone()).collect())
            .unwrap_or_default()
    }

    /// Full entries recorded for `tab_id`, oldest first.
    pub fn entries(&self, tab_id: TabId) -> Vec<StoredEntry> {
        self.tabs.read().get(&tab_id).cloned().unwrap_or_default()
    }

    /// Drops everything recorded for `tab_id`; returns the number of entries removed.
    pub fn remove(&self, tab_id: TabId) -> usize {
        self.tabs
            .write()
            .remove(&tab_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// The latest page report of `tab_id` with the canvas detections of the
    /// canvas-only entries that belong to it.
    ///
    /// Those are every canvas-only entry after the latest page report, plus
    /// the ones between the previous page report and the latest one that
    /// carry the same url (canvas reads posted while the page was still
    /// loading). Without any page report, the canvas-only entries are merged
    /// onto the first of them. Returns `None` for unknown tabs.
    pub fn merged_latest(&self, tab_id: TabId) -> Option<AnalysisReport> {
        let tabs = self.tabs.read();
        let entries = tabs.get(&tab_id)?;

        let base_index = entries
            .iter()
            .rposition(|e| e.kind == EntryKind::PageReport)
            .unwrap_or(0);
        let base = &entries.get(base_index)?.report;

        let window_start = entries[..base_index]
            .iter()
            .rposition(|e| e.kind == EntryKind::PageReport)
            .map_or(0, |previous| previous + 1);

        let mut detections: Vec<_> = entries[window_start..base_index]
            .iter()
            .filter(|e| e.kind == EntryKind::CanvasOnly && e.report.url() == base.url())
            .flat_map(|e| e.report.canvas_detections().iter().cloned())
            .collect();
        detections.extend(base.canvas_detections().iter().cloned());
        detections.extend(
            entries[base_index + 1..]
                .iter()
                .filter(|e| e.kind == EntryKind::CanvasOnly)
                .flat_map(|e| e.report.canvas_detections().iter().cloned()),
        );

        Some(base.clone().with_canvas_detections(detections))
    }

    /// Tabs with at least one entry.
    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tabs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.read().is_empty()
    }
}

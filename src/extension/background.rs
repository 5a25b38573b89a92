//! Background service: records tab reports and answers popup queries.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::channel::{MessageProcessor, Reply, RuntimeEvent};
use super::messages::{ExtensionMessage, MessageSender, TabId, TrackersResponse};
use super::store::{EntryKind, TabReportStore};
use crate::detection::CanvasInterceptionEvent;
use crate::report::{AnalysisReport, BrowserInfo, ExportReport, ReportBuilder};

/// Handles runtime events against a [`TabReportStore`].
pub struct BackgroundService {
    store: Arc<TabReportStore>,
}

impl Default for BackgroundService {
    fn default() -> Self {
        Self::new(Arc::new(TabReportStore::new()))
    }
}

impl BackgroundService {
    pub fn new(store: Arc<TabReportStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TabReportStore> {
        &self.store
    }

    /// Handles one runtime message.
    ///
    /// Only `GET_TRACKERS` produces a reply. Reports from senders without a
    /// tab are dropped.
    pub fn handle_message(&self, message: ExtensionMessage, sender: &MessageSender) -> Reply {
        match message {
            ExtensionMessage::TrackerDetected { data } => {
                let Some(tab_id) = sender.tab_id() else {
                    warn!("Ignoring TRACKER_DETECTED without a sender tab");
                    return None;
                };
                debug!(
                    "Tab {}: page report for {} ({} third-party domain(s))",
                    tab_id,
                    data.url(),
                    data.summary().total_third_party_domains
                );
                self.store.append(tab_id, EntryKind::PageReport, data);
                None
            }
            ExtensionMessage::CanvasFingerprint { data } => {
                let Some(tab_id) = sender.tab_id() else {
                    warn!("Ignoring CANVAS_FINGERPRINT without a sender tab");
                    return None;
                };
                debug!("Tab {}: canvas {} detected", tab_id, data.method);
                let entry = self.canvas_entry(data, sender);
                self.store.append(tab_id, EntryKind::CanvasOnly, entry);
                None
            }
            ExtensionMessage::GetTrackers { tab_id } => Some(TrackersResponse {
                trackers: self.store.get(tab_id),
            }),
        }
    }

    /// Wraps a canvas observation in its own report entry.
    fn canvas_entry(&self, event: CanvasInterceptionEvent, sender: &MessageSender) -> AnalysisReport {
        let url = event
            .url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| sender.tab_url().map(str::to_string))
            .unwrap_or_default();
        let timestamp = event.timestamp.unwrap_or_else(|| self.store.clock().now());

        AnalysisReport::new(url, timestamp).with_canvas_detections(vec![event])
    }

    /// Forgets everything recorded for a closed tab.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        let removed = self.store.remove(tab_id);
        debug!("Tab {} closed, dropped {} entr(ies)", tab_id, removed);
    }

    pub fn handle_event(&self, event: RuntimeEvent) -> Reply {
        match event {
            RuntimeEvent::Message { message, sender } => self.handle_message(message, &sender),
            RuntimeEvent::TabRemoved { tab_id } => {
                self.on_tab_removed(tab_id);
                None
            }
        }
    }

    /// Builds the export for a tab from its merged latest report.
    pub fn export(
        &self,
        tab_id: TabId,
        tab_url: Option<&str>,
        browser: BrowserInfo,
        extension_version: &str,
    ) -> ExportReport {
        let mut builder = ReportBuilder::new()
            .latest(self.store.merged_latest(tab_id))
            .browser(browser)
            .extension_version(extension_version)
            .clock(Arc::clone(self.store.clock()));
        if let Some(url) = tab_url {
            builder = builder.fallback_url(url);
        }
        builder.build()
    }

    /// Serves events until every channel handle is dropped.
    pub async fn run(self: Arc<Self>, mut processor: MessageProcessor) {
        info!("Background service started");
        processor
            .process(|event| {
                let service = Arc::clone(&self);
                async move { service.handle_event(event) }
            })
            .await;
        info!("Background service stopped");
    }
}

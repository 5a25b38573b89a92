//! Runtime message contract between content script, background and popup.

use serde::{Deserialize, Serialize};

use crate::detection::CanvasInterceptionEvent;
use crate::report::AnalysisReport;

/// Browser tab identifier.
pub type TabId = i64;

/// A runtime message, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtensionMessage {
    /// A page analysis from the content script.
    #[serde(rename = "TRACKER_DETECTED")]
    TrackerDetected { data: AnalysisReport },

    /// A live canvas observation from the page context.
    #[serde(rename = "CANVAS_FINGERPRINT")]
    CanvasFingerprint { data: CanvasInterceptionEvent },

    /// Popup request for everything recorded for a tab.
    #[serde(rename = "GET_TRACKERS")]
    GetTrackers {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

impl ExtensionMessage {
    /// The wire name of this message type.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtensionMessage::TrackerDetected { .. } => "TRACKER_DETECTED",
            ExtensionMessage::CanvasFingerprint { .. } => "CANVAS_FINGERPRINT",
            ExtensionMessage::GetTrackers { .. } => "GET_TRACKERS",
        }
    }
}

/// Reply to [`ExtensionMessage::GetTrackers`]; most recent entry last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackersResponse {
    pub trackers: Vec<AnalysisReport>,
}

/// The tab a message was sent from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderTab {
    pub id: TabId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Origin of a runtime message. Popup messages carry no tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<SenderTab>,
}

impl MessageSender {
    /// A sender without a tab (popup, other extension pages).
    pub fn extension() -> Self {
        Self { tab: None }
    }

    /// A content-script sender in tab `id`.
    pub fn tab(id: TabId, url: Option<&str>) -> Self {
        Self {
            tab: Some(SenderTab {
                id,
                url: url.map(str::to_string),
            }),
        }
    }

    pub fn tab_id(&self) -> Option<TabId> {
        self.tab.as_ref().map(|t| t.id)
    }

    pub fn tab_url(&self) -> Option<&str> {
        self.tab.as_ref().and_then(|t| t.url.as_deref())
    }
}

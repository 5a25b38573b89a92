//! Content-script side: analyzes the live document and reports to the
//! background.

use tracing::{debug, info, warn};

use super::channel::{ChannelError, MessageChannel};
use super::messages::{ExtensionMessage, MessageSender};
use crate::analysis::{AnalysisError, PageAnalyzer};
use crate::browser::DomAccessor;
use crate::config::AnalyzerSettings;
use crate::detection::{install_interception, CanvasApi, InterceptedCanvasApi, InterceptionSettings};
use crate::report::AnalysisReport;

/// Failure of a content-script run.
#[derive(Debug, thiserror::Error)]
pub enum ContentScriptError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// The content script running in one tab.
pub struct ContentScript {
    analyzer: PageAnalyzer,
    channel: MessageChannel,
    sender: MessageSender,
    interception: InterceptionSettings,
}

impl ContentScript {
    /// Creates a content script posting to `channel` as `sender`.
    pub fn new(channel: MessageChannel, sender: MessageSender) -> Self {
        Self {
            analyzer: PageAnalyzer::new(),
            channel,
            sender,
            interception: InterceptionSettings::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: PageAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Takes the canvas watch delay from `settings`.
    pub fn with_settings(mut self, settings: &AnalyzerSettings) -> Self {
        self.interception = InterceptionSettings::from(settings);
        self
    }

    pub fn with_interception(mut self, interception: InterceptionSettings) -> Self {
        self.interception = interception;
        self
    }

    pub fn interception(&self) -> &InterceptionSettings {
        &self.interception
    }

    /// Analyzes the document and posts a `TRACKER_DETECTED` message.
    ///
    /// Returns the posted report.
    pub async fn run(&self, accessor: &dyn DomAccessor) -> Result<AnalysisReport, ContentScriptError> {
        let report = self.analyzer.analyze_document(accessor).await?;
        info!(
            "Detected {} third-party domain(s) on {}",
            report.summary().total_third_party_domains,
            report.url()
        );

        self.channel.post_message(
            ExtensionMessage::TrackerDetected {
                data: report.clone(),
            },
            self.sender.clone(),
        )?;
        Ok(report)
    }

    /// Installs canvas interception that posts every observation as a
    /// `CANVAS_FINGERPRINT` message.
    ///
    /// Returns `None` if the host has no canvas APIs.
    pub fn install_canvas_monitor<A: CanvasApi>(&self, api: Option<A>) -> Option<InterceptedCanvasApi<A>> {
        let channel = self.channel.clone();
        let sender = self.sender.clone();

        install_interception(api, self.interception.clone(), move |event| {
            debug!("Posting canvas {} observation", event.method);
            let message = ExtensionMessage::CanvasFingerprint { data: event };
            if let Err(e) = channel.post_message(message, sender.clone()) {
                warn!("Dropped canvas observation: {}", e);
            }
        })
    }
}

//! Extension layer.
//!
//! Models the browser extension's three contexts around the detection
//! engine: the content script analyzing each page, the background service
//! keeping an append-only report log per tab, and the popup reading it back.
//! Contexts talk through typed [`messages`] over a [`channel`].
//!
//! # Submodules
//!
//! - [`messages`] - Runtime message contract
//! - [`channel`] - Async message bus between contexts
//! - [`store`] - Per-tab report log
//! - [`background`] - Message handling and tab lifecycle
//! - [`content`] - Live-document analysis and canvas monitoring
//! - [`popup`] - Popup view model

pub mod background;
pub mod channel;
pub mod content;
pub mod messages;
pub mod popup;
pub mod store;

pub use background::BackgroundService;
pub use channel::{ChannelError, MessageChannel, MessageProcessor, RuntimeEvent};
pub use content::{ContentScript, ContentScriptError};
pub use messages::{ExtensionMessage, MessageSender, SenderTab, TabId, TrackersResponse};
pub use popup::PopupView;
pub use store::{EntryKind, StoredEntry, TabReportStore};

//! Live canvas interception.
//!
//! Static text scanning cannot see canvas reads assembled at runtime
//! (`c[m]()`, minified bundles, eval'd code). This module wraps the three
//! canvas capabilities fingerprinting scripts depend on and reports every
//! invocation as a [`CanvasInterceptionEvent`]:
//!
//! - `toDataURL` and `getImageData` are reported synchronously,
//! - `createElement("canvas")` arms a fire-once timer; a canvas that is still
//!   detached from the document (or attached with a negligible size) when it
//!   fires is reported.
//!
//! Interception never changes results: the wrapped calls return exactly what
//! the original capability returned, and failures to inspect a canvas are
//! swallowed.
//!
//! Two forms are provided: [`InterceptedCanvasApi`], a decorator over any
//! [`CanvasApi`] implementation, and [`interception_script`], the equivalent
//! page-context JavaScript injected by the extension.
//!
//! # Example
//!
//! ```rust
//! use privacy_analyzer::detection::canvas::{
//!     install_interception, CanvasApi, CanvasElement, InterceptionSettings, IntrospectionError,
//! };
//!
//! #[derive(Clone)]
//! struct Canvas;
//!
//! impl CanvasElement for Canvas {
//!     fn tag_name(&self) -> String { "canvas".into() }
//!     fn width(&self) -> Result<u32, IntrospectionError> { Ok(300) }
//!     fn height(&self) -> Result<u32, IntrospectionError> { Ok(150) }
//!     fn is_connected(&self) -> Result<bool, IntrospectionError> { Ok(true) }
//! }
//!
//! struct Host;
//!
//! impl CanvasApi for Host {
//!     type Element = Canvas;
//!     type ImageData = Vec<u8>;
//!
//!     fn to_data_url(&self, _canvas: &Canvas, _mime_type: Option<&str>) -> String {
//!         "data:image/png;base64,".into()
//!     }
//!     fn get_image_data(&self, _canvas: &Canvas, _sx: i32, _sy: i32, sw: u32, sh: u32) -> Vec<u8> {
//!         vec![0; (sw * sh * 4) as usize]
//!     }
//!     fn create_element(&self, _tag_name: &str) -> Canvas { Canvas }
//! }
//!
//! let intercepted = install_interception(Some(Host), InterceptionSettings::default(), |event| {
//!     println!("canvas access: {:?}", event.method);
//! })
//! .unwrap();
//!
//! assert_eq!(intercepted.to_data_url(&Canvas, None), "data:image/png;base64,");
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};

/// Note attached to canvases that were never attached to the document.
pub const NOTE_DETACHED: &str = "Canvas created but not attached to the document";

/// Note attached to attached canvases too small to be visible.
pub const NOTE_NEGLIGIBLE_SIZE: &str = "Canvas attached with negligible size";

/// Default delay before a created canvas is inspected.
pub const DEFAULT_WATCH_DELAY_MS: u64 = 1000;

/// Intercepted canvas capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanvasMethod {
    #[serde(rename = "toDataURL")]
    ToDataUrl,
    #[serde(rename = "getImageData")]
    GetImageData,
    #[serde(rename = "createElement")]
    CreateElement,
}

impl fmt::Display for CanvasMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasMethod::ToDataUrl => write!(f, "toDataURL"),
            CanvasMethod::GetImageData => write!(f, "getImageData"),
            CanvasMethod::CreateElement => write!(f, "createElement"),
        }
    }
}

/// A runtime observation of a canvas API invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasInterceptionEvent {
    /// Which capability was invoked.
    pub method: CanvasMethod,

    /// Canvas width, if it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Canvas height, if it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Whether the canvas was attached to the document.
    #[serde(rename = "inDOM", default)]
    pub in_dom: bool,

    /// When the invocation was observed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::report::timestamp::option"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    /// Explanation for heuristic detections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Page the invocation happened on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CanvasInterceptionEvent {
    /// Creates an event with unknown size, outside the document.
    pub fn new(method: CanvasMethod) -> Self {
        Self {
            method,
            width: None,
            height: None,
            in_dom: false,
            timestamp: None,
            note: None,
            url: None,
        }
    }

    /// Formats the size as `WxH`, with `unknown` for unreadable dimensions.
    pub fn size_label(&self) -> String {
        let dim = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_else(|| "unknown".into());
        format!("{}x{}", dim(self.width), dim(self.height))
    }
}

/// Failure to inspect a live canvas or DOM node.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Canvas introspection failed: {0}")]
pub struct IntrospectionError(pub String);

/// Read-only view of a live element handed out by a [`CanvasApi`].
pub trait CanvasElement: Clone + Send + Sync + 'static {
    /// Lower- or upper-case tag name of the element.
    fn tag_name(&self) -> String;

    fn width(&self) -> Result<u32, IntrospectionError>;

    fn height(&self) -> Result<u32, IntrospectionError>;

    /// Whether the element is currently attached to the document.
    fn is_connected(&self) -> Result<bool, IntrospectionError>;
}

/// The live capabilities instrumented for canvas fingerprinting.
///
/// `get_image_data` takes the canvas owning the 2D context being read.
pub trait CanvasApi: Send + Sync {
    type Element: CanvasElement;
    type ImageData;

    fn to_data_url(&self, canvas: &Self::Element, mime_type: Option<&str>) -> String;

    fn get_image_data(
        &self,
        canvas: &Self::Element,
        sx: i32,
        sy: i32,
        sw: u32,
        sh: u32,
    ) -> Self::ImageData;

    fn create_element(&self, tag_name: &str) -> Self::Element;
}

/// Receives interception events.
pub type EventSink = Arc<dyn Fn(CanvasInterceptionEvent) + Send + Sync>;

/// Interception parameters.
#[derive(Debug, Clone)]
pub struct InterceptionSettings {
    /// Delay before a created canvas is inspected.
    pub watch_delay: Duration,

    /// Page URL stamped onto every event.
    pub page_url: Option<String>,
}

impl Default for InterceptionSettings {
    fn default() -> Self {
        Self {
            watch_delay: Duration::from_millis(DEFAULT_WATCH_DELAY_MS),
            page_url: None,
        }
    }
}

impl InterceptionSettings {
    pub fn with_watch_delay(mut self, delay: Duration) -> Self {
        self.watch_delay = delay;
        self
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }
}

/// Reads size and attachment, substituting unknown values on failure.
fn describe<E: CanvasElement>(element: &E) -> (Option<u32>, Option<u32>, bool) {
    let width = element
        .width()
        .map_err(|e| trace!("Ignoring width read failure: {}", e))
        .ok();
    let height = element
        .height()
        .map_err(|e| trace!("Ignoring height read failure: {}", e))
        .ok();
    let in_dom = element
        .is_connected()
        .map_err(|e| trace!("Ignoring attachment read failure: {}", e))
        .unwrap_or(false);
    (width, height, in_dom)
}

/// Decides whether a canvas created `watch_delay` ago should be reported.
///
/// Returns `None` for canvases attached with a visible size, and when the
/// attachment state cannot be read.
pub fn assess_created_canvas<E: CanvasElement>(
    element: &E,
    watch_delay: Duration,
    now: DateTime<Utc>,
    page_url: Option<String>,
) -> Option<CanvasInterceptionEvent> {
    let connected = match element.is_connected() {
        Ok(connected) => connected,
        Err(e) => {
            trace!("Skipping created canvas check: {}", e);
            return None;
        }
    };
    let (width, height, _) = describe(element);

    let note = if !connected {
        format!("{} within {}ms", NOTE_DETACHED, watch_delay.as_millis())
    } else if width.map_or(false, |w| w <= 1) || height.map_or(false, |h| h <= 1) {
        NOTE_NEGLIGIBLE_SIZE.to_string()
    } else {
        return None;
    };

    Some(CanvasInterceptionEvent {
        method: CanvasMethod::CreateElement,
        width,
        height,
        in_dom: connected,
        timestamp: Some(now),
        note: Some(note),
        url: page_url,
    })
}

/// A [`CanvasApi`] decorator that reports every instrumented call.
pub struct InterceptedCanvasApi<A: CanvasApi> {
    inner: A,
    sink: EventSink,
    settings: InterceptionSettings,
    clock: Arc<dyn Clock>,
}

impl<A: CanvasApi> InterceptedCanvasApi<A> {
    /// Wraps `inner`, delivering events to `sink`.
    pub fn new(inner: A, settings: InterceptionSettings, sink: EventSink) -> Self {
        Self {
            inner,
            sink,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to stamp events.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the original capability.
    pub fn into_inner(self) -> A {
        self.inner
    }

    pub fn settings(&self) -> &InterceptionSettings {
        &self.settings
    }

    fn report(&self, method: CanvasMethod, canvas: &A::Element) {
        let (width, height, in_dom) = describe(canvas);
        (self.sink)(CanvasInterceptionEvent {
            method,
            width,
            height,
            in_dom,
            timestamp: Some(self.clock.now()),
            note: None,
            url: self.settings.page_url.clone(),
        });
    }

    fn watch_attachment(&self, element: A::Element) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime available, skipping created canvas watch");
                return;
            }
        };

        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);
        let delay = self.settings.watch_delay;
        let page_url = self.settings.page_url.clone();

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(event) = assess_created_canvas(&element, delay, clock.now(), page_url) {
                sink(event);
            }
        });
    }
}

impl<A: CanvasApi> CanvasApi for InterceptedCanvasApi<A> {
    type Element = A::Element;
    type ImageData = A::ImageData;

    fn to_data_url(&self, canvas: &Self::Element, mime_type: Option<&str>) -> String {
        let result = self.inner.to_data_url(canvas, mime_type);
        self.report(CanvasMethod::ToDataUrl, canvas);
        result
    }

    fn get_image_data(
        &self,
        canvas: &Self::Element,
        sx: i32,
        sy: i32,
        sw: u32,
        sh: u32,
    ) -> Self::ImageData {
        let result = self.inner.get_image_data(canvas, sx, sy, sw, sh);
        self.report(CanvasMethod::GetImageData, canvas);
        result
    }

    fn create_element(&self, tag_name: &str) -> Self::Element {
        let element = self.inner.create_element(tag_name);
        if tag_name.eq_ignore_ascii_case("canvas") {
            self.watch_attachment(element.clone());
        }
        element
    }
}

/// Installs interception over `api`.
///
/// Returns `None` when the host does not provide the canvas capabilities;
/// static detection keeps working in that case.
pub fn install_interception<A, F>(
    api: Option<A>,
    settings: InterceptionSettings,
    sink: F,
) -> Option<InterceptedCanvasApi<A>>
where
    A: CanvasApi,
    F: Fn(CanvasInterceptionEvent) + Send + Sync + 'static,
{
    match api {
        Some(api) => Some(InterceptedCanvasApi::new(api, settings, Arc::new(sink))),
        None => {
            debug!("Canvas APIs unavailable, interception not installed");
            None
        }
    }
}

/// Generates the page-context JavaScript that performs canvas interception
/// in a real browser.
///
/// Every observation is posted as a `CANVAS_FINGERPRINT` runtime message.
/// The script must run before page scripts.
pub fn interception_script(settings: &InterceptionSettings) -> String {
    let watch_delay_ms = settings.watch_delay.as_millis();

    format!(
        r#"
// Canvas Interception
(function() {{
    'use strict';

    const WATCH_DELAY_MS = {watch_delay_ms};

    function report(detail) {{
        try {{
            chrome.runtime.sendMessage({{
                type: 'CANVAS_FINGERPRINT',
                data: Object.assign({{ url: window.location.href, timestamp: Date.now() }}, detail)
            }});
        }} catch (e) {{
            // Extension context may be gone
        }}
    }}

    function describe(canvas) {{
        const info = {{ inDOM: false }};
        try {{
            info.width = canvas.width;
            info.height = canvas.height;
            info.inDOM = document.contains(canvas);
        }} catch (e) {{
            // Introspection is best-effort
        }}
        return info;
    }}

    if (typeof HTMLCanvasElement === 'undefined') {{
        return;
    }}

    // toDataURL
    const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
    HTMLCanvasElement.prototype.toDataURL = function() {{
        const result = originalToDataURL.apply(this, arguments);
        report(Object.assign({{ method: 'toDataURL' }}, describe(this)));
        return result;
    }};

    // getImageData
    if (typeof CanvasRenderingContext2D !== 'undefined') {{
        const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
        CanvasRenderingContext2D.prototype.getImageData = function() {{
            const result = originalGetImageData.apply(this, arguments);
            report(Object.assign({{ method: 'getImageData' }}, describe(this.canvas)));
            return result;
        }};
    }}

    // createElement('canvas') that never reaches the document
    const originalCreateElement = Document.prototype.createElement;
    Document.prototype.createElement = function(tagName) {{
        const element = originalCreateElement.apply(this, arguments);
        try {{
            if (String(tagName).toLowerCase() === 'canvas') {{
                const observer = new MutationObserver(function() {{
                    if (document.contains(element)) {{
                        observer.disconnect();
                    }}
                }});
                observer.observe(document.documentElement, {{ childList: true, subtree: true }});
                setTimeout(function() {{
                    observer.disconnect();
                    const info = describe(element);
                    if (!info.inDOM) {{
                        report(Object.assign({{
                            method: 'createElement',
                            note: '{detached} within ' + WATCH_DELAY_MS + 'ms'
                        }}, info));
                    }} else if (info.width <= 1 || info.height <= 1) {{
                        report(Object.assign({{ method: 'createElement', note: '{negligible}' }}, info));
                    }}
                }}, WATCH_DELAY_MS);
            }}
        }} catch (e) {{
            // Never break the page
        }}
        return element;
    }};
}})();
"#,
        watch_delay_ms = watch_delay_ms,
        detached = NOTE_DETACHED,
        negligible = NOTE_NEGLIGIBLE_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone)]
    struct FakeCanvas {
        tag: String,
        size: Option<(u32, u32)>,
        connected: Arc<AtomicBool>,
        broken: bool,
    }

    impl FakeCanvas {
        fn new(tag: &str, size: Option<(u32, u32)>) -> Self {
            Self {
                tag: tag.to_string(),
                size,
                connected: Arc::new(AtomicBool::new(false)),
                broken: false,
            }
        }
    }

    impl CanvasElement for FakeCanvas {
        fn tag_name(&self) -> String {
            self.tag.clone()
        }

        fn width(&self) -> Result<u32, IntrospectionError> {
            self.size
                .map(|(w, _)| w)
                .ok_or_else(|| IntrospectionError("width unavailable".into()))
        }

        fn height(&self) -> Result<u32, IntrospectionError> {
            self.size
                .map(|(_, h)| h)
                .ok_or_else(|| IntrospectionError("height unavailable".into()))
        }

        fn is_connected(&self) -> Result<bool, IntrospectionError> {
            if self.broken {
                Err(IntrospectionError("detached context".into()))
            } else {
                Ok(self.connected.load(Ordering::SeqCst))
            }
        }
    }

    struct FakeApi;

    impl CanvasApi for FakeApi {
        type Element = FakeCanvas;
        type ImageData = Vec<u8>;

        fn to_data_url(&self, _canvas: &FakeCanvas, mime_type: Option<&str>) -> String {
            format!("data:{},AAAA", mime_type.unwrap_or("image/png"))
        }

        fn get_image_data(&self, _canvas: &FakeCanvas, _sx: i32, _sy: i32, sw: u32, sh: u32) -> Vec<u8> {
            vec![7; (sw * sh * 4) as usize]
        }

        fn create_element(&self, tag_name: &str) -> FakeCanvas {
            FakeCanvas::new(tag_name, Some((300, 150)))
        }
    }

    fn collecting_sink() -> (Arc<Mutex<Vec<CanvasInterceptionEvent>>>, impl Fn(CanvasInterceptionEvent) + Send + Sync + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        (events, move |event| sink_events.lock().push(event))
    }

    #[test]
    fn test_install_without_api_is_noop() {
        let (events, sink) = collecting_sink();
        let installed = install_interception::<FakeApi, _>(None, InterceptionSettings::default(), sink);
        assert!(installed.is_none());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_to_data_url_passthrough_and_report() {
        let (events, sink) = collecting_sink();
        let api = install_interception(
            Some(FakeApi),
            InterceptionSettings::default().with_page_url("https://example.com/"),
            sink,
        )
        .unwrap();

        let canvas = FakeCanvas::new("canvas", Some((16, 16)));
        let url = api.to_data_url(&canvas, Some("image/jpeg"));
        assert_eq!(url, "data:image/jpeg,AAAA");

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, CanvasMethod::ToDataUrl);
        assert_eq!(events[0].width, Some(16));
        assert!(!events[0].in_dom);
        assert_eq!(events[0].url.as_deref(), Some("https://example.com/"));
        assert!(events[0].timestamp.is_some());
    }

    #[test]
    fn test_introspection_failure_is_swallowed() {
        let (events, sink) = collecting_sink();
        let api = install_interception(Some(FakeApi), InterceptionSettings::default(), sink).unwrap();

        let mut canvas = FakeCanvas::new("canvas", None);
        canvas.broken = true;
        let data = api.get_image_data(&canvas, 0, 0, 2, 2);
        assert_eq!(data.len(), 16);

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, CanvasMethod::GetImageData);
        assert_eq!(events[0].size_label(), "unknownxunknown");
    }

    #[test]
    fn test_create_element_without_runtime_returns_element() {
        let (events, sink) = collecting_sink();
        let api = install_interception(Some(FakeApi), InterceptionSettings::default(), sink).unwrap();

        let element = api.create_element("canvas");
        assert_eq!(element.tag_name(), "canvas");
        assert!(events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_canvas_reported_after_delay() {
        let (events, sink) = collecting_sink();
        let api = install_interception(
            Some(FakeApi),
            InterceptionSettings::default().with_watch_delay(Duration::from_millis(500)),
            sink,
        )
        .unwrap();

        let _canvas = api.create_element("CANVAS");
        let _div = api.create_element("div");
        assert!(events.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, CanvasMethod::CreateElement);
        assert_eq!(
            events[0].note.as_deref(),
            Some("Canvas created but not attached to the document within 500ms")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_canvas_not_reported() {
        let (events, sink) = collecting_sink();
        let api = install_interception(Some(FakeApi), InterceptionSettings::default(), sink).unwrap();

        let canvas = api.create_element("canvas");
        canvas.connected.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(DEFAULT_WATCH_DELAY_MS + 100)).await;
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_assess_negligible_size() {
        let canvas = FakeCanvas::new("canvas", Some((1, 1)));
        canvas.connected.store(true, Ordering::SeqCst);

        let event = assess_created_canvas(&canvas, Duration::from_secs(1), Utc::now(), None).unwrap();
        assert!(event.in_dom);
        assert_eq!(event.note.as_deref(), Some(NOTE_NEGLIGIBLE_SIZE));
    }

    #[test]
    fn test_assess_unreadable_canvas_skipped() {
        let mut canvas = FakeCanvas::new("canvas", Some((300, 150)));
        canvas.broken = true;
        assert!(assess_created_canvas(&canvas, Duration::from_secs(1), Utc::now(), None).is_none());
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"method":"toDataURL","width":220,"height":30,"inDOM":false,"timestamp":1761145424059}"#;
        let event: CanvasInterceptionEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.method, CanvasMethod::ToDataUrl);
        assert_eq!(event.size_label(), "220x30");

        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["inDOM"], serde_json::Value::Bool(false));
        assert_eq!(out["method"], "toDataURL");
        assert!(out.get("note").is_none());
    }

    #[test]
    fn test_interception_script() {
        let script = interception_script(&InterceptionSettings::default());
        assert!(script.contains("toDataURL"));
        assert!(script.contains("getImageData"));
        assert!(script.contains("createElement"));
        assert!(script.contains("CANVAS_FINGERPRINT"));
        assert!(script.contains("const WATCH_DELAY_MS = 1000;"));
    }
}

//! Live-document access abstraction.
//!
//! The extension's content script analyzes the document it runs in rather
//! than fetched HTML. [`DomAccessor`] is the seam between the analyzer and
//! whatever host provides that document; [`MockDomAccessor`] backs tests.
//!
//! # Example
//!
//! ```rust
//! use privacy_analyzer::browser::dom::{DomAccessor, DomElement, MockDomAccessor, EXTERNAL_SCRIPTS};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let accessor = MockDomAccessor::at("https://example.com/");
//!     accessor.add_script(DomElement::external_script("https://cdn.example.net/a.js"));
//!
//!     for script in accessor.find_elements(EXTERNAL_SCRIPTS).await? {
//!         println!("External script: {:?}", script.src());
//!     }
//!
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selector for scripts loaded from a URL.
pub const EXTERNAL_SCRIPTS: &str = "script[src]";

/// Selector for scripts with an inline body.
pub const INLINE_SCRIPTS: &str = "script:not([src])";

/// Selector for canvas elements.
pub const CANVASES: &str = "canvas";

/// A DOM element snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomElement {
    /// HTML tag name (e.g., "script", "canvas").
    pub tag_name: String,

    /// Element attributes as key-value pairs.
    pub attributes: HashMap<String, String>,

    /// Text content of the element (may be empty).
    pub text_content: String,
}

impl DomElement {
    /// Creates an element with no attributes and no text.
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            attributes: HashMap::new(),
            text_content: String::new(),
        }
    }

    /// Creates a `<script src="...">` element.
    pub fn external_script(src: impl Into<String>) -> Self {
        Self::new("script").with_attribute("src", src)
    }

    /// Creates an inline `<script>` element.
    pub fn inline_script(body: impl Into<String>) -> Self {
        let mut element = Self::new("script");
        element.text_content = body.into();
        element
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Checks if the element has a specific attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Gets the element's src attribute.
    pub fn src(&self) -> Option<&String> {
        self.attributes.get("src")
    }
}

/// Trait for querying the live document of a browser tab.
///
/// Implementations must support at least the selectors
/// [`EXTERNAL_SCRIPTS`], [`INLINE_SCRIPTS`] and [`CANVASES`].
#[async_trait]
pub trait DomAccessor: Send + Sync {
    /// Finds all elements matching the given CSS selector, in document order.
    async fn find_elements(&self, selector: &str) -> Result<Vec<DomElement>>;

    /// Returns the document's current URL.
    async fn location(&self) -> Result<String>;
}

/// Mock DOM accessor for testing purposes.
pub struct MockDomAccessor {
    elements: RwLock<HashMap<String, Vec<DomElement>>>,
    location: RwLock<String>,
}

impl Default for MockDomAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDomAccessor {
    /// Creates a mock document at `about:blank` with no elements.
    pub fn new() -> Self {
        Self {
            elements: RwLock::new(HashMap::new()),
            location: RwLock::new("about:blank".to_string()),
        }
    }

    /// Creates a mock document at `url`.
    pub fn at(url: &str) -> Self {
        let accessor = Self::new();
        accessor.set_location(url);
        accessor
    }

    /// Adds mock elements for a selector.
    pub fn add_elements(&self, selector: &str, elements: Vec<DomElement>) {
        self.elements
            .write()
            .entry(selector.to_string())
            .or_default()
            .extend(elements);
    }

    /// Adds a single mock element for a selector.
    pub fn add_element(&self, selector: &str, element: DomElement) {
        self.add_elements(selector, vec![element]);
    }

    /// Adds a script element under the matching script selector.
    pub fn add_script(&self, element: DomElement) {
        let selector = if element.has_attribute("src") {
            EXTERNAL_SCRIPTS
        } else {
            INLINE_SCRIPTS
        };
        self.add_element(selector, element);
    }

    pub fn set_location(&self, url: &str) {
        *self.location.write() = url.to_string();
    }
}

#[async_trait]
impl DomAccessor for MockDomAccessor {
    async fn find_elements(&self, selector: &str) -> Result<Vec<DomElement>> {
        let map = self.elements.read();
        Ok(map.get(selector).cloned().unwrap_or_default())
    }

    async fn location(&self) -> Result<String> {
        Ok(self.location.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_element() {
        let script = DomElement::external_script("https://cdn.example.net/a.js")
            .with_attribute("async", "");

        assert_eq!(script.tag_name, "script");
        assert!(script.has_attribute("async"));
        assert_eq!(script.src().map(String::as_str), Some("https://cdn.example.net/a.js"));

        let inline = DomElement::inline_script("eval(x)");
        assert!(inline.src().is_none());
        assert!(!inline.has_attribute("src"));
        assert_eq!(inline.text_content, "eval(x)");
    }

    #[tokio::test]
    async fn test_mock_dom_accessor() {
        let accessor = MockDomAccessor::at("https://example.com/");

        accessor.add_script(DomElement::external_script("/local.js"));
        accessor.add_script(DomElement::inline_script("first()"));
        accessor.add_script(DomElement::inline_script("second()"));

        let inline = accessor.find_elements(INLINE_SCRIPTS).await.unwrap();
        assert_eq!(
            inline.iter().map(|e| e.text_content.as_str()).collect::<Vec<_>>(),
            vec!["first()", "second()"]
        );

        let external = accessor.find_elements(EXTERNAL_SCRIPTS).await.unwrap();
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].src().map(String::as_str), Some("/local.js"));

        assert!(accessor.find_elements(CANVASES).await.unwrap().is_empty());
        assert_eq!(accessor.location().await.unwrap(), "https://example.com/");

        accessor.set_location("https://example.com/next");
        assert_eq!(accessor.location().await.unwrap(), "https://example.com/next");
    }
}

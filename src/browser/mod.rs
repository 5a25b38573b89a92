//! Host browser integration.
//!
//! # Submodules
//!
//! - [`dom`] - Live-document access used by the content script

pub mod dom;

pub use dom::{DomAccessor, DomElement, MockDomAccessor};

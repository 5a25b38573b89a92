//! The detection engine.
//!
//! Pure, synchronous analysis functions shared by the CLI and the extension
//! layer.
//!
//! # Submodules
//!
//! - [`domain`] - First- vs third-party script origin classification
//! - [`patterns`] - Dangerous dynamic-code-execution pattern scanning
//! - [`fingerprint`] - Static fingerprinting-API detection
//! - [`canvas`] - Live canvas API interception

pub mod canvas;
pub mod domain;
pub mod fingerprint;
pub mod patterns;

pub use canvas::{
    install_interception, interception_script, CanvasApi, CanvasElement,
    CanvasInterceptionEvent, CanvasMethod, InterceptedCanvasApi, InterceptionSettings,
    IntrospectionError,
};
pub use domain::{is_third_party, third_party_domains};
pub use fingerprint::{detect_static, FingerprintSignal};
pub use patterns::{scan, scan_code, DangerousPatternMatch};

//! Static fingerprinting-API detection.
//!
//! Detects a fixed, closed vocabulary of browser APIs commonly used for
//! device identification. Each signal is an independent case-insensitive
//! regex run against every inline script body, plus one structural check for
//! `<canvas>` elements in the document.
//!
//! Static detection cannot see calls assembled at runtime; the live canvas
//! interception in [`crate::detection::canvas`] complements it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A fingerprinting signal identifier.
///
/// The serialized form is the dotted identifier (e.g. `canvas.toDataURL`).
/// Identifiers emitted by older releases (`canvas`, `screen.width`,
/// `screen.height`) are accepted when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FingerprintSignal {
    /// At least one `<canvas>` element is present.
    #[serde(rename = "canvas.element_present", alias = "canvas")]
    CanvasElementPresent,
    #[serde(rename = "canvas.getContext")]
    CanvasGetContext,
    #[serde(rename = "canvas.toDataURL")]
    CanvasToDataUrl,
    #[serde(rename = "canvas.toBlob")]
    CanvasToBlob,
    #[serde(rename = "navigator.plugins")]
    NavigatorPlugins,
    #[serde(rename = "navigator.userAgent")]
    NavigatorUserAgent,
    #[serde(rename = "navigator.hardwareConcurrency")]
    NavigatorHardwareConcurrency,
    /// Reads of screen width/height/color depth.
    #[serde(rename = "screen.dimensions", alias = "screen.width", alias = "screen.height")]
    ScreenDimensions,
    #[serde(rename = "webgl.getParameter")]
    WebglGetParameter,
    /// AudioContext / OfflineAudioContext construction.
    #[serde(rename = "audio.context")]
    AudioContext,
}

impl FingerprintSignal {
    /// All signals in reporting order.
    pub fn all() -> &'static [FingerprintSignal] {
        &[
            FingerprintSignal::CanvasElementPresent,
            FingerprintSignal::CanvasGetContext,
            FingerprintSignal::CanvasToDataUrl,
            FingerprintSignal::CanvasToBlob,
            FingerprintSignal::NavigatorPlugins,
            FingerprintSignal::NavigatorUserAgent,
            FingerprintSignal::NavigatorHardwareConcurrency,
            FingerprintSignal::ScreenDimensions,
            FingerprintSignal::WebglGetParameter,
            FingerprintSignal::AudioContext,
        ]
    }

    /// The dotted identifier of this signal.
    pub fn id(&self) -> &'static str {
        match self {
            FingerprintSignal::CanvasElementPresent => "canvas.element_present",
            FingerprintSignal::CanvasGetContext => "canvas.getContext",
            FingerprintSignal::CanvasToDataUrl => "canvas.toDataURL",
            FingerprintSignal::CanvasToBlob => "canvas.toBlob",
            FingerprintSignal::NavigatorPlugins => "navigator.plugins",
            FingerprintSignal::NavigatorUserAgent => "navigator.userAgent",
            FingerprintSignal::NavigatorHardwareConcurrency => "navigator.hardwareConcurrency",
            FingerprintSignal::ScreenDimensions => "screen.dimensions",
            FingerprintSignal::WebglGetParameter => "webgl.getParameter",
            FingerprintSignal::AudioContext => "audio.context",
        }
    }

    /// Textual signature for signals detected in script bodies.
    ///
    /// Returns `None` for structural signals.
    fn signature(&self) -> Option<&'static str> {
        match self {
            FingerprintSignal::CanvasElementPresent => None,
            FingerprintSignal::CanvasGetContext => Some(r"\.\s*getContext\s*\("),
            FingerprintSignal::CanvasToDataUrl => Some(r"\.\s*toDataURL\s*\("),
            FingerprintSignal::CanvasToBlob => Some(r"\.\s*toBlob\s*\("),
            FingerprintSignal::NavigatorPlugins => Some(r"\bnavigator\s*\.\s*plugins\b"),
            FingerprintSignal::NavigatorUserAgent => Some(r"\bnavigator\s*\.\s*userAgent\b"),
            FingerprintSignal::NavigatorHardwareConcurrency => {
                Some(r"\bnavigator\s*\.\s*hardwareConcurrency\b")
            }
            FingerprintSignal::ScreenDimensions => {
                Some(r"\bscreen\s*\.\s*(?:width|height|availWidth|availHeight|colorDepth|pixelDepth)\b")
            }
            FingerprintSignal::WebglGetParameter => Some(r"\.\s*getParameter\s*\("),
            FingerprintSignal::AudioContext => Some(r"\b(?:Offline)?AudioContext\b"),
        }
    }
}

impl fmt::Display for FingerprintSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for FingerprintSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canvas" => return Ok(FingerprintSignal::CanvasElementPresent),
            "screen.width" | "screen.height" => return Ok(FingerprintSignal::ScreenDimensions),
            _ => {}
        }
        FingerprintSignal::all()
            .iter()
            .find(|signal| signal.id() == s)
            .copied()
            .ok_or_else(|| format!("Unknown fingerprinting signal: {}", s))
    }
}

static SIGNAL_MATCHERS: Lazy<Vec<(FingerprintSignal, Regex)>> = Lazy::new(|| {
    FingerprintSignal::all()
        .iter()
        .filter_map(|signal| {
            signal.signature().map(|pattern| {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("invalid fingerprint signature regex");
                (*signal, regex)
            })
        })
        .collect()
});

/// Detects fingerprinting signals in inline script bodies.
///
/// `canvas_count` is the number of `<canvas>` elements in the document. The
/// result contains each signal at most once, in [`FingerprintSignal::all`]
/// order.
pub fn detect_static<I, S>(inline_bodies: I, canvas_count: usize) -> Vec<FingerprintSignal>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    // Ord follows declaration order, which is the reporting order.
    let mut found = BTreeSet::new();

    if canvas_count > 0 {
        found.insert(FingerprintSignal::CanvasElementPresent);
    }

    for body in inline_bodies {
        let body = body.as_ref();
        for (signal, regex) in SIGNAL_MATCHERS.iter() {
            if !found.contains(signal) && regex.is_match(body) {
                found.insert(*signal);
            }
        }
    }

    found.into_iter().collect()
}

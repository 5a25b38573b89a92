//! Popup view model.
//!
//! Condenses a tab's recorded reports into what the popup shows: the first
//! few third-party domains, the number of inline scripts with eval patterns,
//! and a numbered list of canvas observations.

use crate::detection::CanvasInterceptionEvent;
use crate::report::AnalysisReport;

/// Number of domains listed before collapsing into "... and N more".
pub const POPUP_DOMAIN_LIMIT: usize = 3;

/// Number of canvas observations listed before collapsing.
pub const POPUP_CANVAS_LIMIT: usize = 10;

/// What the popup renders for one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    pub top_domains: Vec<String>,
    pub more_domains: usize,
    pub eval_script_count: usize,
    pub canvas_lines: Vec<String>,
    pub more_canvas: usize,
}

impl PopupView {
    /// Builds the view from the latest of `trackers`.
    ///
    /// Returns `None` when nothing has been recorded yet.
    pub fn from_trackers(trackers: &[AnalysisReport]) -> Option<Self> {
        let latest = trackers.last()?;

        let domains = latest.third_party_domains();
        let canvas = latest.canvas_detections();

        Some(Self {
            top_domains: domains.iter().take(POPUP_DOMAIN_LIMIT).cloned().collect(),
            more_domains: domains.len().saturating_sub(POPUP_DOMAIN_LIMIT),
            eval_script_count: latest.inline_eval_patterns().len(),
            canvas_lines: canvas
                .iter()
                .take(POPUP_CANVAS_LIMIT)
                .enumerate()
                .map(|(i, event)| canvas_line(i + 1, event))
                .collect(),
            more_canvas: canvas.len().saturating_sub(POPUP_CANVAS_LIMIT),
        })
    }
}

/// Formats `#n: method (WxH)` with the note appended when present.
pub fn canvas_line(number: usize, event: &CanvasInterceptionEvent) -> String {
    let mut line = format!("#{}: {} ({})", number, event.method, event.size_label());
    if let Some(note) = &event.note {
        line.push_str(" - ");
        line.push_str(note);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::CanvasMethod;
    use chrono::Utc;

    #[test]
    fn test_empty_trackers() {
        assert!(PopupView::from_trackers(&[]).is_none());
    }

    #[test]
    fn test_uses_latest_report() {
        let older = AnalysisReport::new("https://a.test/", Utc::now())
            .with_third_party_domains(vec!["old.test".into()]);
        let latest = AnalysisReport::new("https://a.test/", Utc::now()).with_third_party_domains(
            ["a.test", "b.test", "c.test", "d.test", "e.test"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        );

        let view = PopupView::from_trackers(&[older, latest]).unwrap();
        assert_eq!(view.top_domains, vec!["a.test", "b.test", "c.test"]);
        assert_eq!(view.more_domains, 2);
        assert_eq!(view.eval_script_count, 0);
        assert!(view.canvas_lines.is_empty());
    }

    #[test]
    fn test_canvas_lines() {
        let mut detached = CanvasInterceptionEvent::new(CanvasMethod::CreateElement);
        detached.width = Some(300);
        detached.height = Some(150);
        detached.note = Some("Canvas created but not attached to the document within 1000ms".into());

        let events: Vec<CanvasInterceptionEvent> = std::iter::once(detached)
            .chain((0..11).map(|_| CanvasInterceptionEvent::new(CanvasMethod::ToDataUrl)))
            .collect();
        let report = AnalysisReport::new("https://a.test/", Utc::now()).with_canvas_detections(events);

        let view = PopupView::from_trackers(&[report]).unwrap();
        assert_eq!(view.canvas_lines.len(), POPUP_CANVAS_LIMIT);
        assert_eq!(
            view.canvas_lines[0],
            "#1: createElement (300x150) - Canvas created but not attached to the document within 1000ms"
        );
        assert_eq!(view.canvas_lines[1], "#2: toDataURL (unknownxunknown)");
        assert_eq!(view.more_canvas, 2);
    }
}

//! Dangerous dynamic-code-execution pattern scanning.
//!
//! Scans JavaScript source for eval-family constructs and reports every
//! occurrence with its line, column and a snippet of the surrounding line.
//!
//! Comments are removed before scanning so that commented-out code does not
//! produce findings. The removal is textual: it is not a tokenizer and will
//! also strip comment-like sequences inside string literals (for example the
//! `//` of a URL literal). This is an accepted limitation of the heuristic.
//!
//! # Example
//!
//! ```rust
//! use privacy_analyzer::detection::patterns::scan_code;
//!
//! let matches = scan_code("const x = 1;\neval(payload);");
//! assert_eq!(matches.len(), 1);
//! assert_eq!(matches[0].pattern, "eval");
//! assert_eq!(matches[0].line, 2);
//! assert_eq!(matches[0].column, 0);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum snippet length in characters before truncation.
pub const SNIPPET_MAX_CHARS: usize = 80;

/// A single occurrence of a dangerous pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousPatternMatch {
    /// Catalogue name of the pattern (e.g. "eval").
    pub pattern: String,

    /// Human-readable description of the pattern.
    #[serde(default)]
    pub description: String,

    /// 1-based line number in the comment-stripped code.
    pub line: usize,

    /// 0-based column (in characters) in the comment-stripped code.
    #[serde(default)]
    pub column: usize,

    /// Trimmed source line, truncated to 80 characters plus "...".
    #[serde(default)]
    pub snippet: String,
}

/// One entry of the pattern catalogue.
pub struct PatternDefinition {
    pub name: &'static str,
    pub description: &'static str,
    regex: Regex,
    /// Characters that must not immediately precede a match.
    forbidden_prefix: Option<fn(char) -> bool>,
}

impl PatternDefinition {
    fn new(name: &'static str, pattern: &str, description: &'static str) -> Self {
        Self {
            name,
            description,
            regex: Regex::new(pattern).expect("invalid dangerous pattern regex"),
            forbidden_prefix: None,
        }
    }

    fn not_preceded_by(mut self, predicate: fn(char) -> bool) -> Self {
        self.forbidden_prefix = Some(predicate);
        self
    }

    /// Returns the byte offsets of every match of this pattern in `code`.
    fn match_offsets<'a>(&'a self, code: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.regex
            .find_iter(code)
            .map(|m| m.start())
            .filter(move |&start| match self.forbidden_prefix {
                Some(forbidden) => code[..start]
                    .chars()
                    .next_back()
                    .map_or(true, |prev| !forbidden(prev)),
                None => true,
            })
    }
}

fn is_identifier_or_dot(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// The fixed pattern catalogue, in reporting order.
pub static PATTERN_CATALOGUE: Lazy<Vec<PatternDefinition>> = Lazy::new(|| {
    vec![
        PatternDefinition::new("eval", r"(?-u:\b)eval\s*\(", "Direct eval() call"),
        PatternDefinition::new(
            "Function constructor",
            r"(?-u:\b)new\s+Function\s*\(",
            "Function constructor with string",
        ),
        // The regex crate has no look-behind; the prefix check replaces it.
        PatternDefinition::new(
            "Function constructor (no new)",
            r"Function\s*\(",
            "Function constructor without new keyword",
        )
        .not_preceded_by(is_identifier_or_dot),
        PatternDefinition::new(
            "setTimeout with string",
            r#"(?-u:\b)setTimeout\s*\(\s*['"`]"#,
            "setTimeout with string argument",
        ),
        PatternDefinition::new(
            "setInterval with string",
            r#"(?-u:\b)setInterval\s*\(\s*['"`]"#,
            "setInterval with string argument",
        ),
        PatternDefinition::new(
            "Obfuscated eval (bracket notation)",
            r#"(?-u:\b)window\s*\[\s*['"`]eval['"`]\s*\]"#,
            "Obfuscated eval using bracket notation",
        ),
        PatternDefinition::new(
            "Obfuscated eval (this)",
            r#"(?-u:\b)this\s*\[\s*['"`]eval['"`]\s*\]"#,
            "Obfuscated eval using this",
        ),
    ]
});

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"//[^\r\n]*").unwrap());

/// Removes block comments and then line comments from `code`.
pub fn strip_comments(code: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(code, "");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Position of a byte offset within split lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineContext {
    pub line: usize,
    pub column: usize,
    pub snippet: String,
}

/// Locates the byte `offset` within `lines` (text split on `\n`).
///
/// Lines are walked with a running total of `len + 1` per line. An offset past
/// the end falls back to line 1, column 0 with the first line as snippet.
pub fn line_context(lines: &[&str], offset: usize) -> LineContext {
    let mut line_start = 0;
    for (i, line) in lines.iter().enumerate() {
        let line_len = line.len() + 1;
        if line_start + line_len > offset {
            let byte_column = (offset - line_start).min(line.len());
            return LineContext {
                line: i + 1,
                column: line[..byte_column].chars().count(),
                snippet: truncate_snippet(line.trim()),
            };
        }
        line_start += line_len;
    }

    LineContext {
        line: 1,
        column: 0,
        snippet: lines
            .first()
            .map(|l| l.chars().take(SNIPPET_MAX_CHARS).collect())
            .unwrap_or_default(),
    }
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() > SNIPPET_MAX_CHARS {
        let mut snippet: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
        snippet.push_str("...");
        snippet
    } else {
        text.to_string()
    }
}

/// Scans optional code; `None` behaves like an empty string.
pub fn scan(code: Option<&str>) -> Vec<DangerousPatternMatch> {
    code.map(scan_code).unwrap_or_default()
}

/// Scans `code` for every catalogue pattern.
///
/// Each occurrence yields its own match. Different patterns may report the
/// same position (`new Function(` matches both Function patterns).
pub fn scan_code(code: &str) -> Vec<DangerousPatternMatch> {
    if code.is_empty() {
        return Vec::new();
    }

    let stripped = strip_comments(code);
    let lines: Vec<&str> = stripped.split('\n').collect();
    let mut detections = Vec::new();

    for definition in PATTERN_CATALOGUE.iter() {
        for offset in definition.match_offsets(&stripped) {
            let context = line_context(&lines, offset);
            detections.push(DangerousPatternMatch {
                pattern: definition.name.to_string(),
                description: definition.description.to_string(),
                line: context.line,
                column: context.column,
                snippet: context.snippet,
            });
        }
    }

    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(matches: &[DangerousPatternMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.pattern.as_str()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(scan_code("").is_empty());
        assert!(scan(None).is_empty());
        assert!(scan(Some("")).is_empty());
    }

    #[test]
    fn test_single_eval() {
        let matches = scan_code("eval('x')");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern, "eval");
        assert_eq!(matches[0].description, "Direct eval() call");
        assert_eq!(matches[0].line, 1);
        assert_eq!(matches[0].column, 0);
        assert_eq!(matches[0].snippet, "eval('x')");
    }

    #[test]
    fn test_each_occurrence_reported() {
        let matches = scan_code("eval(a);\neval(b);\n  eval (c);");
        assert_eq!(matches.len(), 3);
        assert_eq!(
            matches.iter().map(|m| (m.line, m.column)).collect::<Vec<_>>(),
            vec![(1, 0), (2, 0), (3, 2)]
        );
    }

    #[test]
    fn test_commented_eval_ignored() {
        let code = "\n  // eval('bad()')\n  /* new Function('x', 'return x') */\n  const y = 2;\n";
        assert!(scan_code(code).is_empty());

        let cleaned = strip_comments(code);
        assert!(!cleaned.contains("eval("));
        assert!(!cleaned.contains("Function("));
    }

    #[test]
    fn test_multiline_block_comment() {
        let code = "/* start\n eval(x)\n end */ run();";
        assert!(scan_code(code).is_empty());
    }

    #[test]
    fn test_positions_use_stripped_text() {
        // The block comment disappears, so eval starts at column 0 of line 1.
        let matches = scan_code("/* note */eval(x)");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].column, 0);
    }

    #[test]
    fn test_function_constructor_variants() {
        let matches = scan_code("var f = new Function('a', 'return a');");
        assert_eq!(
            names(&matches),
            vec!["Function constructor", "Function constructor (no new)"]
        );

        let matches = scan_code("var g = Function('return this')();");
        assert_eq!(names(&matches), vec!["Function constructor (no new)"]);
    }

    #[test]
    fn test_function_suffix_and_member_not_matched() {
        assert!(scan_code("someFunction(1); obj.Function(2); my_Function(3);").is_empty());
    }

    #[test]
    fn test_timers_with_string_argument() {
        let matches = scan_code("setTimeout(\"tick()\", 10); setInterval( 'tock()', 5);");
        assert_eq!(
            names(&matches),
            vec!["setTimeout with string", "setInterval with string"]
        );

        assert!(scan_code("setTimeout(tick, 10); setInterval(() => go(), 5);").is_empty());
    }

    #[test]
    fn test_obfuscated_eval() {
        let matches = scan_code("window['eval'](code); this[\"eval\"](code); window[`eval`]");
        assert_eq!(
            names(&matches),
            vec![
                "Obfuscated eval (bracket notation)",
                "Obfuscated eval (bracket notation)",
                "Obfuscated eval (this)",
            ]
        );
    }

    #[test]
    fn test_case_sensitive() {
        assert!(scan_code("EVAL(x); settimeout('x')").is_empty());
    }

    #[test]
    fn test_word_boundary_is_ascii() {
        let matches = scan_code("ñeval(x)");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern, "eval");
        assert_eq!(matches[0].column, 1);

        assert_eq!(scan_code("éthis['eval']").len(), 1);
        assert!(scan_code("xeval(x)").is_empty());
    }

    #[test]
    fn test_snippet_truncation() {
        let long = format!("eval({});", "a".repeat(200));
        let matches = scan_code(&long);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].snippet.chars().count(), SNIPPET_MAX_CHARS + 3);
        assert!(matches[0].snippet.ends_with("..."));
    }

    #[test]
    fn test_column_counts_characters() {
        let matches = scan_code("const s = 'é'; eval(s)");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].column, 15);
    }

    #[test]
    fn test_line_context_fallback() {
        let lines = vec!["first line", "second"];
        let ctx = line_context(&lines, 1000);
        assert_eq!(ctx.line, 1);
        assert_eq!(ctx.column, 0);
        assert_eq!(ctx.snippet, "first line");
    }

    #[test]
    fn test_url_in_string_is_stripped() {
        // Known limitation: the `//` of the URL starts a line comment.
        let matches = scan_code("load('https://x.test'); eval(y)");
        assert!(matches.is_empty());
    }
}

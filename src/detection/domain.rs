//! Third-party script origin classification.
//!
//! The classification is a literal, directional suffix comparison between the
//! page host and a script host. It does NOT consult the public suffix list, so
//! `cdn.example.com` is reported as third-party on `example.com` while
//! `example.com` is first-party on `www.example.com`.
//!
//! # Example
//!
//! ```rust
//! use privacy_analyzer::detection::domain::is_third_party;
//!
//! assert!(is_third_party("example.com", "www.google-analytics.com"));
//! assert!(!is_third_party("example.com", "example.com"));
//! assert!(!is_third_party("www.example.com", "example.com"));
//! ```

use std::collections::HashSet;

use tracing::debug;
use url::Url;

/// Returns true if `candidate_host` should be treated as a third party of
/// `page_host`.
///
/// Empty hosts are never third-party. A candidate that `page_host` ends with
/// (e.g. the bare form of the page host) is considered first-party.
pub fn is_third_party(page_host: &str, candidate_host: &str) -> bool {
    if page_host.is_empty() || candidate_host.is_empty() {
        return false;
    }
    if page_host == candidate_host {
        return false;
    }
    !page_host.ends_with(candidate_host)
}

/// Resolves every raw `src` against `page_url` and returns the unique set of
/// third-party hostnames, in first-seen order.
///
/// Sources that fail to resolve, or resolve to a URL without a host
/// (`data:`, `blob:`, ...), are skipped.
pub fn third_party_domains<I, S>(page_url: &Url, srcs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let page_host = page_url.host_str().unwrap_or_default();
    let mut seen = HashSet::new();
    let mut domains = Vec::new();

    for src in srcs {
        let src = src.as_ref();
        let resolved = match page_url.join(src) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping unresolvable script src {:?}: {}", src, e);
                continue;
            }
        };

        let Some(host) = resolved.host_str() else {
            debug!("Skipping script src without host: {}", src);
            continue;
        };

        if is_third_party(page_host, host) && seen.insert(host.to_string()) {
            domains.push(host.to_string());
        }
    }

    domains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_same_host_is_first_party() {
        assert!(!is_third_party("example.com", "example.com"));
        assert!(!is_third_party("a.b.c", "a.b.c"));
    }

    #[test]
    fn test_empty_hosts() {
        assert!(!is_third_party("", "example.com"));
        assert!(!is_third_party("example.com", ""));
        assert!(!is_third_party("", ""));
    }

    #[test]
    fn test_suffix_rule_is_asymmetric() {
        // Page host ends with the candidate: first-party
        assert!(!is_third_party("www.example.com", "example.com"));
        // Candidate is a subdomain of the page host: third-party
        assert!(is_third_party("example.com", "cdn.example.com"));
        // Literal suffix, not label-aware
        assert!(!is_third_party("notexample.com", "example.com"));
    }

    #[test]
    fn test_unrelated_hosts() {
        assert!(is_third_party("example.com", "www.google-analytics.com"));
        assert!(is_third_party("example.com", "cdn.example.net"));
    }

    #[test]
    fn test_batch_dedupes_and_resolves_relative() {
        let domains = third_party_domains(
            &page("https://example.com/articles/1"),
            [
                "https://cdn.example.com/lib.js",
                "https://www.google-analytics.com/ga.js",
                "https://www.google-analytics.com/analytics.js",
                "/static/app.js",
                "vendor/local.js",
                "//tracker.net/t.js",
            ],
        );

        assert_eq!(domains.len(), 3);
        assert!(domains.contains(&"cdn.example.com".to_string()));
        assert!(domains.contains(&"www.google-analytics.com".to_string()));
        assert!(domains.contains(&"tracker.net".to_string()));
    }

    #[test]
    fn test_batch_skips_hostless_sources() {
        let domains = third_party_domains(
            &page("https://example.com/"),
            ["data:text/javascript,alert(1)", "http://[::1", "https://ads.net/x.js"],
        );
        assert_eq!(domains, vec!["ads.net".to_string()]);
    }
}

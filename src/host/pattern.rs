//! Host pattern normalization and matching.
//!
//! Patterns are bare hosts (`example.com`) or wildcard hosts
//! (`*.example.com`). Matching is deliberately loose: `www.x.com`,
//! `m.x.com` and `x.com` are treated as the same site on either side.

use std::collections::HashSet;
use url::Url;

/// Prefix marking a wildcard pattern.
pub const WILDCARD_PREFIX: &str = "*.";

/// Common subdomain labels that do not distinguish sites.
const COMMON_SUBDOMAINS: &[&str] = &["www.", "m."];

/// Strip a single leading `www.` or `m.` label.
pub fn strip_common_subdomain(host: &str) -> &str {
    COMMON_SUBDOMAINS
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix))
        .unwrap_or(host)
}

/// Normalize a raw user entry into a stored pattern.
///
/// Returns `None` for empty input, `#` comments, or entries that reduce to
/// nothing. URLs are reduced to their hostname, trailing dots are dropped,
/// and `www.`/`m.` labels are stripped from non-wildcard entries. The
/// result is a fixed point: normalizing it again yields the same pattern.
pub fn normalize_pattern(raw: &str) -> Option<String> {
    let entry = raw.trim().to_lowercase();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let (wildcard, entry) = match entry.strip_prefix(WILDCARD_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, entry.as_str()),
    };
    let entry = entry.trim_start_matches('.');

    let extracted = extract_hostname(entry);
    let mut host = extracted
        .as_deref()
        .unwrap_or(entry)
        .trim_start_matches('.')
        .trim_end_matches('.');

    if !wildcard {
        loop {
            let stripped = strip_common_subdomain(host);
            if stripped.len() == host.len() {
                break;
            }
            host = stripped;
        }
    }

    if host.is_empty() {
        return None;
    }

    Some(if wildcard {
        format!("{WILDCARD_PREFIX}{host}")
    } else {
        host.to_string()
    })
}

/// Pull the hostname out of entries that look like URLs.
fn extract_hostname(entry: &str) -> Option<String> {
    let parsed = if entry.contains("://") {
        Url::parse(entry).ok()?
    } else if entry.contains('/') {
        Url::parse(&format!("https://{entry}")).ok()?
    } else {
        return None;
    };
    parsed.host_str().map(str::to_string)
}

/// Check whether a page host is covered by a stored pattern.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    if host.is_empty() || pattern.is_empty() {
        return false;
    }

    let host = host.to_lowercase();
    let pattern = pattern.to_lowercase();
    let host_base = strip_common_subdomain(&host);

    if let Some(wild) = pattern.strip_prefix(WILDCARD_PREFIX) {
        let pattern_base = strip_common_subdomain(wild);
        let suffix = format!(".{pattern_base}");
        return host == pattern_base
            || host.ends_with(&suffix)
            || host_base == pattern_base
            || host_base.ends_with(&suffix);
    }

    let pattern_base = strip_common_subdomain(&pattern);
    host == pattern || host_base == pattern || host == pattern_base || host_base == pattern_base
}

/// Parse a newline-separated block of entries.
///
/// Invalid and comment lines are dropped; duplicates keep their first
/// position.
pub fn parse_locked_sites(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .filter_map(normalize_pattern)
        .filter(|pattern| seen.insert(pattern.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize_pattern("  Example.COM  "), Some("example.com".to_string()));
    }

    #[test]
    fn test_normalize_strips_common_subdomains() {
        assert_eq!(normalize_pattern("www.example.com"), Some("example.com".to_string()));
        assert_eq!(normalize_pattern("m.example.com"), Some("example.com".to_string()));
        assert_eq!(normalize_pattern("mail.example.com"), Some("mail.example.com".to_string()));
    }

    #[test]
    fn test_normalize_keeps_wildcard_prefix() {
        assert_eq!(normalize_pattern("*.Example.com"), Some("*.example.com".to_string()));
        assert_eq!(normalize_pattern("*.www.example.com"), Some("*.www.example.com".to_string()));
    }

    #[test]
    fn test_normalize_extracts_hostname_from_urls() {
        assert_eq!(
            normalize_pattern("https://www.example.com/path?q=1"),
            Some("example.com".to_string())
        );
        assert_eq!(normalize_pattern("example.com/feed"), Some("example.com".to_string()));
        assert_eq!(
            normalize_pattern("*.https://news.example.com/"),
            Some("*.news.example.com".to_string())
        );
    }

    #[test]
    fn test_normalize_strips_dots() {
        assert_eq!(normalize_pattern("..example.com."), Some("example.com".to_string()));
    }

    #[test]
    fn test_normalize_rejects_empty_and_comments() {
        assert_eq!(normalize_pattern(""), None);
        assert_eq!(normalize_pattern("   "), None);
        assert_eq!(normalize_pattern("# example.com"), None);
        assert_eq!(normalize_pattern("*."), None);
        assert_eq!(normalize_pattern("..."), None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "www.www.example.com",
            "https://m.example.com/x",
            "*.Example.com.",
            "example.com..",
            "..m.example.com",
            "shop.example.co.uk",
        ];
        for input in inputs {
            let once = normalize_pattern(input).unwrap();
            assert_eq!(normalize_pattern(&once), Some(once.clone()), "input {input}");
        }
    }

    #[test]
    fn test_matches_common_subdomain_variants() {
        for host in ["x.com", "www.x.com", "m.x.com"] {
            for pattern in ["x.com", "www.x.com", "m.x.com"] {
                assert!(host_matches(host, pattern), "{host} vs {pattern}");
            }
        }
    }

    #[test]
    fn test_wildcard_matches_subdomains_and_apex() {
        assert!(host_matches("a.b.com", "*.b.com"));
        assert!(host_matches("deep.a.b.com", "*.b.com"));
        assert!(host_matches("b.com", "*.b.com"));
        assert!(host_matches("www.b.com", "*.b.com"));
        assert!(host_matches("b.com", "*.www.b.com"));
    }

    #[test]
    fn test_wildcard_rejects_suffix_lookalikes() {
        assert!(!host_matches("evilb.com", "*.b.com"));
        assert!(!host_matches("b.com.evil.net", "*.b.com"));
    }

    #[test]
    fn test_exact_pattern_does_not_cover_other_subdomains() {
        assert!(!host_matches("shop.example.com", "example.com"));
        assert!(!host_matches("example.com", "shop.example.com"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        assert!(host_matches("WWW.Example.COM", "example.com"));
        assert!(host_matches("shop.example.com", "*.EXAMPLE.com"));
    }

    #[test]
    fn test_matches_rejects_empty() {
        assert!(!host_matches("", "example.com"));
        assert!(!host_matches("example.com", ""));
    }

    #[test]
    fn test_parse_locked_sites_dedupes() {
        let text = "example.com\n# comment\nwww.example.com\r\n\n*.news.org\nhttps://example.com/a";
        assert_eq!(
            parse_locked_sites(text),
            vec!["example.com".to_string(), "*.news.org".to_string()]
        );
    }
}

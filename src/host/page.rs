//! Identity of the page an engine instance enforces.

use crate::host::pattern::{host_matches, strip_common_subdomain};
use url::Url;

/// Hostname of the loaded page plus its normalized unlock-table key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHost {
    host: String,
    key: String,
}

impl PageHost {
    /// Build from a bare hostname.
    ///
    /// Returns `None` when the hostname is empty.
    pub fn new(hostname: &str) -> Option<Self> {
        let host = hostname.trim().trim_end_matches('.').to_lowercase();
        if host.is_empty() {
            return None;
        }
        let key = strip_common_subdomain(&host).to_string();
        Some(Self { host, key })
    }

    /// Build from a full page URL.
    ///
    /// Only `http` and `https` pages are eligible for enforcement.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        match parsed.scheme() {
            "http" | "https" => Self::new(parsed.host_str()?),
            _ => None,
        }
    }

    /// Lowercased page hostname.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Key used in the temporary and session unlock tables.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether any of the given patterns covers this page.
    pub fn is_locked_by<'a, I>(&self, patterns: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        patterns
            .into_iter()
            .any(|pattern| host_matches(&self.host, pattern))
    }

    /// Whether a `lock-now` request for `target` applies to this page.
    ///
    /// A missing or empty target addresses the receiving page.
    pub fn is_targeted_by(&self, target: Option<&str>) -> bool {
        let Some(target) = target else {
            return true;
        };
        let target = target.trim().to_lowercase();
        let target_key = strip_common_subdomain(&target);
        target_key.is_empty() || target_key == self.key || host_matches(&self.host, &target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_accepts_http_and_https() {
        let page = PageHost::from_url("https://WWW.Example.com/path").unwrap();
        assert_eq!(page.host(), "www.example.com");
        assert_eq!(page.key(), "example.com");
        assert!(PageHost::from_url("http://example.com").is_some());
    }

    #[test]
    fn test_from_url_rejects_other_schemes() {
        assert!(PageHost::from_url("chrome://extensions").is_none());
        assert!(PageHost::from_url("file:///tmp/a.html").is_none());
        assert!(PageHost::from_url("not a url").is_none());
    }

    #[test]
    fn test_new_rejects_empty() {
        assert!(PageHost::new("  ").is_none());
    }

    #[test]
    fn test_is_locked_by() {
        let page = PageHost::new("shop.example.com").unwrap();
        assert!(page.is_locked_by(["*.example.com"]));
        assert!(!page.is_locked_by(["example.com", "other.org"]));
    }

    #[test]
    fn test_is_targeted_by() {
        let page = PageHost::new("www.example.com").unwrap();
        assert!(page.is_targeted_by(None));
        assert!(page.is_targeted_by(Some("")));
        assert!(page.is_targeted_by(Some("example.com")));
        assert!(page.is_targeted_by(Some("M.Example.com")));
        assert!(!page.is_targeted_by(Some("other.org")));
    }
}

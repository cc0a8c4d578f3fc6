//! Host matching and locked-set handling through the public API.

use tabguard::host::page::PageHost;
use tabguard::host::pattern::{host_matches, normalize_pattern, parse_locked_sites};
use tabguard::protocol::messages::InboundMessage;
use tabguard::store::memory::MemoryStore;
use tabguard::store::models::{LockedHostSet, SessionUnlockSet, TempUnlockTable};
use tabguard::store::unlocks::{lock_host, reset_session_unlocks, set_session_unlock, set_temp_unlock};
use tabguard::store::{keys, StateStore};

#[test]
fn wildcard_covers_apex_and_subdomains() {
    for host in ["example.com", "www.example.com", "a.b.example.com", "m.shop.example.com"] {
        assert!(host_matches(host, "*.example.com"), "{host}");
    }
    assert!(!host_matches("notexample.com", "*.example.com"));
    assert!(!host_matches("example.org", "*.example.com"));
}

#[test]
fn bare_pattern_ignores_common_subdomains_only() {
    assert!(host_matches("www.example.com", "example.com"));
    assert!(host_matches("m.example.com", "www.example.com"));
    assert!(!host_matches("shop.example.com", "example.com"));
}

#[test]
fn normalized_patterns_are_fixed_points() {
    let raw = [
        "https://WWW.Example.com/path?q=1",
        "*.News.org.",
        "m.www.site.net",
        "  shop.example.com/cart ",
    ];
    for entry in raw {
        let once = normalize_pattern(entry).unwrap();
        assert_eq!(normalize_pattern(&once), Some(once.clone()), "{entry}");
    }
}

#[test]
fn bulk_parse_drops_comments_and_duplicates() {
    let text = "# work\nexample.com\nwww.example.com\n\n*.news.org\nhttps://example.com/x\n";
    assert_eq!(parse_locked_sites(text), vec!["example.com", "*.news.org"]);
}

#[test]
fn page_host_requires_web_scheme() {
    assert!(PageHost::from_url("chrome://settings").is_none());
    assert!(PageHost::from_url("file:///tmp/a.html").is_none());
    let page = PageHost::from_url("https://www.example.com/a").unwrap();
    assert_eq!(page.key(), "example.com");
    assert!(page.is_locked_by(["example.com"]));
}

#[tokio::test]
async fn lock_host_clears_unlocks_and_targets_page() {
    let store = MemoryStore::new();
    set_temp_unlock(&store, "example.com", i64::MAX).await.unwrap();
    set_session_unlock(&store, "example.com").await.unwrap();

    let message = lock_host(&store, "https://www.example.com/inbox").await.unwrap();
    assert_eq!(message, InboundMessage::lock_now("example.com"));

    let raw = store.get(keys::WATCH_KEYS).await.unwrap();
    let hosts = LockedHostSet::from_store(&raw);
    assert_eq!(hosts.locked_patterns(), vec!["example.com"]);
    assert!(TempUnlockTable::from_store(&raw).get("example.com").is_none());
    assert!(!SessionUnlockSet::from_store(&raw).contains("example.com"));

    let page = PageHost::new("m.example.com").unwrap();
    assert!(hosts.covers(&page));
}

#[tokio::test]
async fn startup_reset_forgets_session_unlocks() {
    let store = MemoryStore::new();
    set_session_unlock(&store, "a.com").await.unwrap();
    set_session_unlock(&store, "b.com").await.unwrap();
    reset_session_unlocks(&store).await.unwrap();

    let raw = store.get(&[keys::SESSION_UNLOCKS]).await.unwrap();
    assert!(SessionUnlockSet::from_store(&raw).is_empty());
}

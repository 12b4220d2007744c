//! Server-side resource cache with TTL, invalidation and a capacity bound.
//!
//! One mutex guards the whole map; every public operation is linearizable.
//! `get` hands out deep copies so callers can hold results across later
//! cache interactions. Expiry uses `tokio::time::Instant`, so tests drive
//! it with the paused clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use polymcp_core::types::ContentItem;

/// Time-to-live for one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache-wide default.
    Default,
    /// The entry never expires.
    Never,
    Secs(u64),
}

impl Ttl {
    /// Signed-seconds mapping: 0 is the default, negative never expires.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            0 => Ttl::Default,
            s if s < 0 => Ttl::Never,
            s => Ttl::Secs(s as u64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceCacheConfig {
    pub capacity: usize,
    pub default_ttl: Duration,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            default_ttl: Duration::from_secs(300),
        }
    }
}

struct CacheEntry {
    content: Vec<ContentItem>,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
    default_ttl: Duration,
}

/// URI → content cache.
pub struct ResourceCache {
    inner: Mutex<Inner>,
}

impl ResourceCache {
    pub fn new(config: ResourceCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                capacity: config.capacity.max(1),
                default_ttl: config.default_ttl,
            }),
        }
    }

    /// Unexpired content for `uri`, deep-copied. Touches `last_accessed`.
    pub fn get(&self, uri: &str) -> Option<Vec<ContentItem>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("resource cache poisoned");
        match inner.entries.get_mut(uri) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                trace!(uri, "resource cache hit");
                Some(entry.content.clone())
            }
            Some(_) => {
                trace!(uri, "resource cache entry expired");
                inner.entries.remove(uri);
                None
            }
            None => None,
        }
    }

    /// Store a deep copy of `content` under `uri`. Inserting a new URI into
    /// a full cache evicts exactly one entry first.
    pub fn put(&self, uri: &str, content: &[ContentItem], ttl: Ttl) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("resource cache poisoned");
        let expires_at = match ttl {
            Ttl::Default => Some(now + inner.default_ttl),
            Ttl::Never => None,
            Ttl::Secs(secs) => Some(now + Duration::from_secs(secs)),
        };

        if !inner.entries.contains_key(uri) && inner.entries.len() >= inner.capacity {
            Self::evict_one(&mut inner, now);
        }

        inner.entries.insert(
            uri.to_string(),
            CacheEntry {
                content: content.to_vec(),
                expires_at,
                last_accessed: now,
            },
        );
    }

    /// One O(capacity) scan: prefer the first expired entry, otherwise the
    /// least-recently-accessed one seen during the scan.
    fn evict_one(inner: &mut Inner, now: Instant) {
        let mut oldest: Option<(&String, Instant)> = None;
        let mut expired: Option<&String> = None;
        for (uri, entry) in &inner.entries {
            if entry.is_expired(now) {
                expired = Some(uri);
                break;
            }
            match oldest {
                Some((_, accessed)) if entry.last_accessed >= accessed => {}
                _ => oldest = Some((uri, entry.last_accessed)),
            }
        }
        let victim = expired.or(oldest.map(|(uri, _)| uri)).cloned();
        if let Some(uri) = victim {
            debug!(uri = %uri, "evicting resource cache entry");
            inner.entries.remove(&uri);
        }
    }

    /// Drop the entry for `uri`, if any. Returns whether one was removed.
    pub fn invalidate(&self, uri: &str) -> bool {
        let mut inner = self.inner.lock().expect("resource cache poisoned");
        inner.entries.remove(uri).is_some()
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("resource cache poisoned");
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        let pruned = before - inner.entries.len();
        if pruned > 0 {
            debug!(pruned, "pruned expired resource cache entries");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("resource cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(ResourceCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, default_ttl: Duration) -> ResourceCache {
        ResourceCache::new(ResourceCacheConfig {
            capacity,
            default_ttl,
        })
    }

    fn item(text: &str) -> Vec<ContentItem> {
        vec![ContentItem::text(text)]
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl_expiry_and_prune() {
        let cache = cache(2, Duration::from_secs(1));
        cache.put("a", &item("X"), Ttl::Default);
        cache.put("b", &item("Y"), Ttl::Default);
        assert_eq!(cache.get("a"), Some(item("X")));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.get("a"), None);
        // `get` already dropped "a"; "b" is still there, expired.
        assert_eq!(cache.prune_expired(), 1);
        assert_eq!(cache.prune_expired(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_ttl_never_expires() {
        let cache = cache(4, Duration::from_secs(1));
        cache.put("pinned", &item("P"), Ttl::from_secs(-1));

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(cache.prune_expired(), 0);
        assert_eq!(cache.get("pinned"), Some(item("P")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_ttl() {
        let cache = cache(4, Duration::from_secs(1));
        cache.put("short", &item("S"), Ttl::from_secs(5));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get("short"), Some(item("S")));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cache.get("short"), None);
    }

    #[test]
    fn test_invalidate_then_get_misses() {
        let cache = cache(4, Duration::from_secs(60));
        cache.put("a", &item("X"), Ttl::Default);
        assert!(cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.invalidate("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bound_evicts_exactly_one() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("a", &item("A"), Ttl::Default);
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.put("b", &item("B"), Ttl::Default);
        tokio::time::advance(Duration::from_millis(10)).await;
        // Touch "a" so "b" is the least recently accessed.
        cache.get("a");
        tokio::time::advance(Duration::from_millis(10)).await;

        cache.put("c", &item("C"), Ttl::Default);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_evicted_first() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("stale", &item("S"), Ttl::Secs(1));
        cache.put("fresh", &item("F"), Ttl::Secs(3600));
        tokio::time::advance(Duration::from_secs(2)).await;

        cache.put("new", &item("N"), Ttl::Default);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_put_replaces_existing_without_eviction() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("a", &item("v1"), Ttl::Default);
        cache.put("b", &item("B"), Ttl::Default);
        cache.put("a", &item("v2"), Ttl::Default);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(item("v2")));
        assert_eq!(cache.get("b"), Some(item("B")));
    }

    #[test]
    fn test_get_returns_deep_copies() {
        let cache = cache(2, Duration::from_secs(60));
        cache.put("a", &item("X"), Ttl::Default);
        let mut copy = cache.get("a").expect("hit");
        copy.push(ContentItem::text("mutated"));
        assert_eq!(cache.get("a"), Some(item("X")));
    }
}

//! Caching
//!
//! A small key/value cache with per-entry TTLs. Entries expire against an
//! injected [`Clock`], never against wall time directly.

use std::{
    fmt::Debug,
    hash::Hash,
    sync::{Mutex, PoisonError},
};

use jiff::{SignedDuration, Timestamp};
use rustc_hash::FxHashMap;

use crate::clock::{Clock, SystemClock};

/// Key/value cache with caller-supplied time-to-live.
pub trait Cache<K, V>: Send + Sync {
    /// Fetch a live entry, if any.
    fn get(&self, key: &K) -> Option<V>;

    /// Store `value` under `key` until `ttl` has elapsed.
    fn insert(&self, key: K, value: V, ttl: SignedDuration);

    /// Drop one entry.
    fn invalidate(&self, key: &K);

    /// Drop every entry.
    fn clear(&self);
}

/// In-process [`Cache`] backed by a hash map.
///
/// Expired entries are evicted lazily on read.
#[derive(Debug)]
pub struct TtlCache<K, V, C = SystemClock> {
    entries: Mutex<FxHashMap<K, (V, Timestamp)>>,
    clock: C,
}

impl<K, V> TtlCache<K, V, SystemClock> {
    /// Create an empty cache using the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<K, V> Default for TtlCache<K, V, SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> TtlCache<K, V, C> {
    /// Create an empty cache that expires entries against `clock`.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            clock,
        }
    }
}

impl<K, V, C> Cache<K, V> for TtlCache<K, V, C>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
    C: Clock,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);

                None
            }
            None => None,
        }
    }

    fn insert(&self, key: K, value: V, ttl: SignedDuration) {
        if ttl <= SignedDuration::ZERO {
            return;
        }

        let Ok(expires_at) = self.clock.now().checked_add(ttl) else {
            return;
        };

        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, (value, expires_at));
    }

    fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::clock::ManualClock;

    use super::*;

    fn cache() -> (Arc<ManualClock>, TtlCache<&'static str, u32, Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new(Timestamp::UNIX_EPOCH));

        (clock.clone(), TtlCache::with_clock(clock))
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let (clock, cache) = cache();

        cache.insert("a", 1, SignedDuration::from_secs(60));

        clock.advance(SignedDuration::from_secs(59));
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(SignedDuration::from_secs(1));
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn non_positive_ttl_is_not_stored() {
        let (_clock, cache) = cache();

        cache.insert("a", 1, SignedDuration::ZERO);

        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn invalidate_and_clear_drop_entries() {
        let (_clock, cache) = cache();

        cache.insert("a", 1, SignedDuration::from_secs(60));
        cache.insert("b", 2, SignedDuration::from_secs(60));

        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));

        cache.clear();
        assert_eq!(cache.get(&"b"), None);
    }
}

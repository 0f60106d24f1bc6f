//! Bounded least-recently-used cache owned by a single mining pass.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use tracing::trace;

use crate::{Error, Result};

/// Small LRU map. Lookups and population happen under one lock so a missing
/// entry is produced at most once even when the cache is shared.
pub(crate) struct BoundedCache<K, V> {
    name: &'static str,
    capacity: usize,
    entries: Mutex<VecDeque<(K, V)>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: PartialEq + fmt::Debug,
    V: Clone,
{
    pub(crate) fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// The most recently used entry lives at the back; the front is evicted
    /// once `capacity` is exceeded. A zero capacity disables caching.
    pub(crate) fn get_or_try_insert_with<F>(&self, key: K, populate: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        let mut entries = self.entries.lock().map_err(|_| Error::CachePoisoned)?;

        if let Some(index) = entries.iter().position(|(cached, _)| *cached == key) {
            trace!(cache = self.name, ?key, "cache hit");
            if let Some(entry) = entries.remove(index) {
                let value = entry.1.clone();
                entries.push_back(entry);
                return Ok(value);
            }
        }

        let value = populate()?;
        if self.capacity == 0 {
            return Ok(value);
        }

        while entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                trace!(cache = self.name, key = ?evicted, "evicted");
            }
        }
        entries.push_back((key, value.clone()));
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }
}

impl<K, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn populates_once_per_key() -> Result<()> {
        let cache = BoundedCache::new("test", 2);
        let calls = Cell::new(0);
        let load = |value: u32| -> Result<u32> {
            calls.set(calls.get() + 1);
            Ok(value)
        };

        assert_eq!(cache.get_or_try_insert_with("a", || load(1))?, 1);
        assert_eq!(cache.get_or_try_insert_with("a", || load(99))?, 1);
        assert_eq!(calls.get(), 1);
        Ok(())
    }

    #[test]
    fn evicts_least_recently_used() -> Result<()> {
        let cache = BoundedCache::new("test", 2);
        cache.get_or_try_insert_with("a", || Ok(1))?;
        cache.get_or_try_insert_with("b", || Ok(2))?;
        // touch "a" so "b" becomes the eviction candidate
        cache.get_or_try_insert_with("a", || Ok(0))?;
        cache.get_or_try_insert_with("c", || Ok(3))?;

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_or_try_insert_with("a", || Ok(0))?, 1);
        assert_eq!(cache.get_or_try_insert_with("b", || Ok(20))?, 20);
        Ok(())
    }

    #[test]
    fn failed_population_is_not_cached() {
        let cache: BoundedCache<&str, u32> = BoundedCache::new("test", 2);
        let result = cache.get_or_try_insert_with("a", || {
            Err(Error::InconsistentDiff {
                reason: "boom".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn zero_capacity_disables_caching() -> Result<()> {
        let cache = BoundedCache::new("test", 0);
        assert_eq!(cache.get_or_try_insert_with("a", || Ok(1))?, 1);
        assert_eq!(cache.get_or_try_insert_with("a", || Ok(2))?, 2);
        assert_eq!(cache.len(), 0);
        Ok(())
    }
}

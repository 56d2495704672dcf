use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use scopegate_core::cache::{CacheBackend, CacheError, CacheValue};

struct Entry {
    value: Arc<CacheValue>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-local cache backend. Values are shared `Arc`s replaced whole
/// under a short write lock.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    bulk_delete: bool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            bulk_delete: true,
        }
    }

    /// A backend without batch deletes.
    pub fn without_bulk_delete() -> Self {
        Self {
            bulk_delete: false,
            ..Self::new()
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .is_some_and(|e| e.is_live(now))
    }

    /// Live keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it unless a writer replaced it meanwhile.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = Entry {
            value: Arc::new(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        if !self.bulk_delete {
            return Err(CacheError::Unsupported("delete_many"));
        }
        let mut entries = self.entries.write();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn ids() -> CacheValue {
        CacheValue::Ids(BTreeSet::new())
    }

    #[test]
    fn expired_entries_are_misses() {
        let cache = InMemoryCache::new();
        cache.set("a", ids(), Some(Duration::ZERO)).unwrap();
        cache.set("b", ids(), None).unwrap();

        assert!(cache.get("a").unwrap().is_none());
        assert!(cache.get("b").unwrap().is_some());
        assert_eq!(cache.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn delete_many_removes_named_keys() {
        let cache = InMemoryCache::new();
        cache.set("sg:access:1:member", ids(), None).unwrap();
        cache.set("sg:access:2:member", ids(), None).unwrap();
        cache.set("sg:role:1", ids(), None).unwrap();

        let keys = ["sg:access:1:member", "sg:access:2:member", "sg:access:3:member"]
            .map(String::from);
        cache.delete_many(&keys).unwrap();
        assert_eq!(cache.keys(), vec!["sg:role:1".to_string()]);
    }

    #[test]
    fn bulk_delete_can_be_disabled() {
        let cache = InMemoryCache::without_bulk_delete();
        assert_eq!(
            cache.delete_many(&["sg:role:1".to_string()]),
            Err(CacheError::Unsupported("delete_many"))
        );
    }
}

//! Typed, failure-tolerant access to the injected cache backend.
//!
//! A failed read is a miss. A failed targeted delete falls back to clearing
//! the whole cache so a stale entry can never outlive an invalidation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use scopegate_core::cache::{CacheBackend, CacheError, CacheKeys, CacheValue};
use scopegate_core::models::access::Action;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct CacheStore<C> {
    backend: C,
    keys: CacheKeys,
    ttl: Option<Duration>,
}

impl<C: CacheBackend> CacheStore<C> {
    pub fn new(backend: C, keys: CacheKeys, ttl: Option<Duration>) -> Self {
        Self { backend, keys, ttl }
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheValue>> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: CacheValue) {
        if let Err(e) = self.backend.set(key, value, self.ttl) {
            warn!(key, error = %e, "cache write failed");
        }
    }

    pub fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key) {
            warn!(key, error = %e, "cache delete failed, clearing cache");
            self.clear();
        }
    }

    /// Delete `keys` in one batch. A backend without batch deletes, or one
    /// that fails the batch, gets a single full clear instead.
    pub fn delete_many(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        match self.backend.delete_many(keys) {
            Ok(()) => debug!(count = keys.len(), "deleted cache entries"),
            Err(CacheError::Unsupported(_)) => {
                debug!(count = keys.len(), "batch deletion unsupported, clearing cache");
                self.clear();
            }
            Err(e) => {
                warn!(count = keys.len(), error = %e, "batch deletion failed, clearing cache");
                self.clear();
            }
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.clear() {
            warn!(error = %e, "cache clear failed");
        }
    }

    /// Drop the access entries of `entity_type` for every listed profile.
    pub fn purge_access<'a>(
        &self,
        profile_ids: impl IntoIterator<Item = &'a Uuid>,
        entity_type: &str,
    ) {
        let keys: Vec<String> = profile_ids
            .into_iter()
            .map(|profile_id| self.keys.access(*profile_id, entity_type))
            .collect();
        self.delete_many(&keys);
    }

    // -----------------------------------------------------------------------
    // Typed reads
    // -----------------------------------------------------------------------

    pub fn ids(&self, key: &str) -> Option<BTreeSet<Uuid>> {
        match self.get(key)?.as_ref() {
            CacheValue::Ids(ids) => Some(ids.clone()),
            other => self.mismatch(key, other),
        }
    }

    pub fn fields(&self, key: &str) -> Option<BTreeSet<String>> {
        match self.get(key)?.as_ref() {
            CacheValue::Fields(fields) => Some(fields.clone()),
            other => self.mismatch(key, other),
        }
    }

    pub fn bit_map(&self, key: &str) -> Option<BTreeMap<String, u32>> {
        match self.get(key)?.as_ref() {
            CacheValue::BitMap(map) => Some(map.clone()),
            other => self.mismatch(key, other),
        }
    }

    pub fn masks(&self, key: &str) -> Option<BTreeMap<Action, u128>> {
        match self.get(key)?.as_ref() {
            CacheValue::Masks(masks) => Some(masks.clone()),
            other => self.mismatch(key, other),
        }
    }

    fn mismatch<T>(&self, key: &str, found: &CacheValue) -> Option<T> {
        warn!(key, ?found, "unexpected cache value kind, dropping entry");
        self.delete(key);
        None
    }
}

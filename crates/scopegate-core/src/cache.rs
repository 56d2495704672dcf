//! Key-value cache interface consumed by the engine.
//!
//! The engine stores only immutable values behind `Arc`, so a reader either
//! sees the old entry or the replacement, never a partial update.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::access::Action;
use crate::models::profile::ProfileKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be encoded or decoded: {0}")]
    Codec(String),
}

/// A cached value. Each key namespace holds exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    /// Permission ids of a bundle, role or profile, or role ids of a partition.
    Ids(BTreeSet<Uuid>),
    /// Effective fields of a scope.
    Fields(BTreeSet<String>),
    /// Field → bit position of an entity type.
    BitMap(BTreeMap<String, u32>),
    /// Action → packed field access mask for one profile and entity type.
    Masks(BTreeMap<Action, u128>),
}

pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>, CacheError>;

    /// Store `value` under `key`. `None` means no expiry.
    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete the named keys in one batch. Missing keys are not an error.
    /// Backends without batch deletes keep the default, and callers fall
    /// back to [`clear`].
    ///
    /// [`clear`]: CacheBackend::clear
    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        let _ = keys;
        Err(CacheError::Unsupported("delete_many"))
    }

    fn clear(&self) -> Result<(), CacheError>;
}

impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Arc<CacheValue>>, CacheError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError> {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key)
    }

    fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        (**self).delete_many(keys)
    }

    fn clear(&self) -> Result<(), CacheError> {
        (**self).clear()
    }
}

/// Builds the namespaced keys the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    prefix: String,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("sg")
    }
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn bundle(&self, bundle_id: Uuid) -> String {
        format!("{}:bundle:{bundle_id}", self.prefix)
    }

    pub fn role(&self, role_id: Uuid) -> String {
        format!("{}:role:{role_id}", self.prefix)
    }

    pub fn profile(&self, profile_id: Uuid) -> String {
        format!("{}:profile:{profile_id}", self.prefix)
    }

    pub fn role_partition(&self, kind: ProfileKind) -> String {
        format!("{}:roles:{kind}", self.prefix)
    }

    pub fn scope_fields(&self, scope_id: Uuid) -> String {
        format!("{}:scope:{scope_id}:fields", self.prefix)
    }

    pub fn bit_map(&self, entity_type: &str) -> String {
        format!("{}:bitmap:{entity_type}", self.prefix)
    }

    pub fn access(&self, profile_id: Uuid, entity_type: &str) -> String {
        format!("{}:access:{profile_id}:{entity_type}", self.prefix)
    }

    /// Access keys of one profile across `entity_types`.
    pub fn access_of_profile<'a>(
        &self,
        profile_id: Uuid,
        entity_types: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        entity_types
            .into_iter()
            .map(|entity_type| self.access(profile_id, entity_type))
            .collect()
    }
}

impl fmt::Display for CacheKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

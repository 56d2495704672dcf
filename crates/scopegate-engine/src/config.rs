//! Engine configuration.

use std::time::Duration;

/// Configuration for the access engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of every cache entry (default: 24 hours). `None` keeps
    /// entries until they are invalidated.
    pub cache_ttl: Option<Duration>,
    /// Namespace prepended to every cache key (default: `sg`).
    pub key_prefix: String,
    /// Longest allowed scope inheritance chain, the scope itself included
    /// (default: 3).
    pub max_inheritance_depth: usize,
    /// Key that marks a JSON object as a record during redaction
    /// (default: `id`).
    pub identifier_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            key_prefix: "sg".into(),
            max_inheritance_depth: 3,
            identifier_key: "id".into(),
        }
    }
}

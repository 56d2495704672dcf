//! Scopegate engine: scope inheritance, permission caching, field
//! bitmasks, row visibility and response redaction.

pub mod aggregator;
pub mod bitmask;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod events;
pub mod memory;
pub mod permissions;
pub mod redact;
pub mod registry;
pub mod row_access;
pub mod seed;
pub mod snapshot;
pub mod store;

pub use cache::PermissionCache;
pub use config::EngineConfig;
pub use diagnostics::{PermissionSummary, RbacSummary};
pub use engine::AccessEngine;
pub use events::CatalogEvent;
pub use memory::{Change, InMemoryCache, InMemoryCatalog};
pub use redact::ResponseRedactor;
pub use registry::{FieldSource, ScopeRegistry};
pub use row_access::{RecordView, RowAccessResolver, RowPredicate};
pub use snapshot::CatalogSnapshot;

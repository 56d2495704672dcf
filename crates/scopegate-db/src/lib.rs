//! Scopegate database: SurrealDB persistence for the catalog.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Repository implementations of the `scopegate-core` traits, with the
//!   same write-time validation as the in-memory catalog
//! - [`load_snapshot`], which reads the whole catalog for the engine
//!
//! Writes return the stored record. The caller forwards the matching
//! `CatalogEvent` to the engine.

mod connection;
mod error;
pub mod repository;
mod schema;
mod snapshot;

pub use connection::{Credentials, DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use snapshot::load_snapshot;

//! Core types for the scopegate access-control engine: domain models, error
//! types, and the catalog, cache and repository interfaces the other crates
//! build on.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod models;
pub mod repository;

pub use error::{ScopegateError, ScopegateResult, ValidationError};

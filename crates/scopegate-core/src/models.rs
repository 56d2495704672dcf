//! Domain models for scopegate.
//!
//! These are the core types shared across all crates.

pub mod access;
pub mod bundle;
pub mod permission;
pub mod profile;
pub mod role;
pub mod schema;
pub mod scope;

//! In-process implementations of the catalog and cache interfaces.

mod cache;
mod catalog;

pub use cache::InMemoryCache;
pub use catalog::{Change, InMemoryCatalog};

//! SurrealDB repository implementations.

mod bundle;
mod edges;
mod permission;
mod profile;
mod role;
mod scope;

use std::str::FromStr;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

pub use bundle::SurrealGrantBundleRepository;
pub use permission::SurrealPermissionRepository;
pub use profile::SurrealProfileRepository;
pub use role::SurrealRoleRepository;
pub use scope::SurrealScopeRepository;

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::InvalidRecord(format!("invalid {what} UUID: {e}")))
}

fn parse_enum<T: FromStr>(value: &str) -> Result<T, DbError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| DbError::InvalidRecord(e.to_string()))
}

//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings. Enums are stored as their snake_case names with ASSERT
//! constraints. Grants and memberships are relation edges.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "catalog_tables",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: catalog tables
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Scopes (self-referencing tree per entity type)
-- =======================================================================
DEFINE TABLE scope SCHEMAFULL;
DEFINE FIELD code ON TABLE scope TYPE string;
DEFINE FIELD name ON TABLE scope TYPE string;
DEFINE FIELD entity_type ON TABLE scope TYPE string;
DEFINE FIELD parent_id ON TABLE scope TYPE option<string>;
DEFINE FIELD included_fields ON TABLE scope TYPE array<string> DEFAULT [];
DEFINE FIELD excluded_fields ON TABLE scope TYPE array<string> DEFAULT [];
DEFINE FIELD category ON TABLE scope TYPE string \
    ASSERT $value IN ['base', 'extension'];
DEFINE FIELD scope_group ON TABLE scope TYPE string DEFAULT '';
DEFINE FIELD is_active ON TABLE scope TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE scope TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE scope TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_scope_code ON TABLE scope COLUMNS code UNIQUE;
DEFINE INDEX idx_scope_entity_type ON TABLE scope COLUMNS entity_type;

-- =======================================================================
-- Permissions (scope, action, row access)
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD scope_id ON TABLE permission TYPE string;
DEFINE FIELD action ON TABLE permission TYPE string \
    ASSERT $value IN ['create', 'get', 'update', 'delete', 'export'];
DEFINE FIELD row_access ON TABLE permission TYPE string \
    ASSERT $value IN ['all', 'profile_hierarchy', 'own'];
DEFINE FIELD description ON TABLE permission TYPE string DEFAULT '';
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_triple ON TABLE permission \
    COLUMNS scope_id, action, row_access UNIQUE;

-- =======================================================================
-- Grant bundles
-- =======================================================================
DEFINE TABLE grant_bundle SCHEMAFULL;
DEFINE FIELD name ON TABLE grant_bundle TYPE string;
DEFINE FIELD description ON TABLE grant_bundle TYPE string DEFAULT '';
DEFINE FIELD created_at ON TABLE grant_bundle TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE grant_bundle TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_grant_bundle_name ON TABLE grant_bundle \
    COLUMNS name UNIQUE;

-- =======================================================================
-- Roles
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string DEFAULT '';
DEFINE FIELD staff_only ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_name ON TABLE role COLUMNS name UNIQUE;

-- =======================================================================
-- Profiles (member and staff variants)
-- =======================================================================
DEFINE TABLE profile SCHEMAFULL;
DEFINE FIELD kind ON TABLE profile TYPE string \
    ASSERT $value IN ['member', 'staff'];
DEFINE FIELD username ON TABLE profile TYPE string;
DEFINE FIELD email ON TABLE profile TYPE string DEFAULT '';
DEFINE FIELD is_active ON TABLE profile TYPE bool DEFAULT true;
DEFINE FIELD profile_type ON TABLE profile TYPE string;
DEFINE FIELD created_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE profile TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_profile_kind_username ON TABLE profile \
    COLUMNS kind, username UNIQUE;

-- =======================================================================
-- Relations
-- =======================================================================

-- Role -> Permission grants
DEFINE TABLE grants TYPE RELATION SCHEMAFULL;

-- Role -> Grant bundle attachment
DEFINE TABLE uses_bundle TYPE RELATION SCHEMAFULL;

-- Grant bundle -> Permission membership
DEFINE TABLE contains TYPE RELATION SCHEMAFULL;

-- Profile -> Role assignment
DEFINE TABLE has_role TYPE RELATION SCHEMAFULL;

-- Profile -> Permission direct grants
DEFINE TABLE holds TYPE RELATION SCHEMAFULL;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Bring the catalog schema up to date.
///
/// Creates the `_migration` tracking table on first run and applies every
/// migration newer than the highest recorded version, in order. Returns
/// the number of migrations applied.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<usize, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let current = current_version(db).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        info!(version = current, "Catalog schema is up to date");
        return Ok(0);
    }

    for migration in &pending {
        apply(db, migration).await?;
    }
    Ok(pending.len())
}

async fn current_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    Ok(records.first().map(|m| m.version).unwrap_or(0))
}

async fn apply<C: Connection>(db: &Surreal<C>, migration: &Migration) -> Result<(), DbError> {
    info!(
        version = migration.version,
        name = migration.name,
        "Applying migration"
    );
    db.query(migration.sql).await?.check().map_err(|e| {
        DbError::Migration(format!(
            "v{} '{}' failed: {e}",
            migration.version, migration.name
        ))
    })?;

    db.query("CREATE _migration SET version = $version, name = $name")
        .bind(("version", migration.version))
        .bind(("name", migration.name))
        .await?
        .check()
        .map_err(|e| {
            DbError::Migration(format!("recording v{} failed: {e}", migration.version))
        })?;
    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_table_is_defined() {
        for table in ["scope", "permission", "grant_bundle", "role", "profile"] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing {table}"
            );
        }
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}

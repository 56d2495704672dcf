//! Loads the persisted catalog into an engine snapshot.

use scopegate_core::error::ScopegateResult;
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::{
    GrantBundleRepository, PermissionRepository, ProfileRepository, RoleRepository,
    ScopeRepository,
};
use scopegate_engine::snapshot::CatalogSnapshot;
use surrealdb::{Connection, Surreal};
use tracing::info;

use crate::repository::{
    SurrealGrantBundleRepository, SurrealPermissionRepository, SurrealProfileRepository,
    SurrealRoleRepository, SurrealScopeRepository,
};

/// Read every catalog record into a [`CatalogSnapshot`]. Entity schemas are
/// not persisted; the caller supplies them.
pub async fn load_snapshot<C: Connection>(
    db: &Surreal<C>,
    schemas: SchemaRegistry,
) -> ScopegateResult<CatalogSnapshot> {
    let scopes = SurrealScopeRepository::new(db.clone(), SchemaRegistry::new())
        .all()
        .await?;
    let permissions = SurrealPermissionRepository::new(db.clone()).all().await?;
    let bundles = SurrealGrantBundleRepository::new(db.clone()).all().await?;
    let roles = SurrealRoleRepository::new(db.clone()).all().await?;
    let profiles = SurrealProfileRepository::new(db.clone()).all().await?;

    info!(
        scopes = scopes.len(),
        permissions = permissions.len(),
        bundles = bundles.len(),
        roles = roles.len(),
        profiles = profiles.len(),
        "loaded catalog snapshot"
    );

    Ok(CatalogSnapshot {
        scopes: scopes.into_iter().map(|s| (s.id, s)).collect(),
        permissions: permissions.into_iter().map(|p| (p.id, p)).collect(),
        bundles: bundles.into_iter().map(|b| (b.id, b)).collect(),
        roles: roles.into_iter().map(|r| (r.id, r)).collect(),
        profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
        schemas,
    })
}

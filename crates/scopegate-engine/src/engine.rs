//! The access engine: queries on the request path and maintenance hooks
//! for the write path.

use std::collections::BTreeSet;

use scopegate_core::cache::CacheBackend;
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::ScopegateResult;
use scopegate_core::models::access::{AccessLevel, Action, FieldAccessMap};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::PermissionCache;
use crate::config::EngineConfig;
use crate::events::CatalogEvent;
use crate::redact::ResponseRedactor;
use crate::row_access::{RowAccessResolver, RowPredicate};

/// Entry point of the engine.
///
/// Generic over the catalog and the cache backend so that it has no
/// dependency on any storage crate.
pub struct AccessEngine<S, C> {
    cache: PermissionCache<S, C>,
}

impl<S: CatalogReader, C: CacheBackend> AccessEngine<S, C> {
    pub fn new(catalog: S, backend: C, config: EngineConfig) -> Self {
        Self {
            cache: PermissionCache::new(catalog, backend, config),
        }
    }

    pub fn cache(&self) -> &PermissionCache<S, C> {
        &self.cache
    }

    pub fn catalog(&self) -> &S {
        self.cache.catalog()
    }

    pub fn config(&self) -> &EngineConfig {
        self.cache.config()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn has_model_permission(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<bool> {
        self.cache.has_model_permission(profile_id, entity_type, action)
    }

    pub fn get_allowed_fields(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<BTreeSet<String>> {
        self.cache.get_allowed_fields(profile_id, entity_type, action)
    }

    pub fn get_allowed_fields_with_access(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<FieldAccessMap> {
        self.cache
            .get_allowed_fields_with_access(profile_id, entity_type, action)
    }

    pub fn get_field_access_level(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
        field: &str,
    ) -> ScopegateResult<AccessLevel> {
        self.cache
            .get_field_access_level(profile_id, entity_type, action, field)
    }

    pub fn has_field_permission(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
        field: &str,
        required: AccessLevel,
    ) -> ScopegateResult<bool> {
        self.cache
            .has_field_permission(profile_id, entity_type, action, field, required)
    }

    /// Which records of `entity_type` the profile may act on. An unknown
    /// profile sees nothing.
    pub fn row_visibility_predicate(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<RowPredicate> {
        let Some(profile) = self.catalog().profile(profile_id)? else {
            return Ok(RowPredicate::DenyAll);
        };
        let access = self.get_allowed_fields_with_access(profile_id, entity_type, action)?;
        let schema = self.catalog().entity_schema(entity_type)?;
        Ok(RowAccessResolver::new(&profile, schema.as_ref())
            .with_identifier_key(&self.config().identifier_key)
            .resolve(&access))
    }

    /// Null every field of `payload` the profile may not see at its level.
    /// Fields outside the access map are left to the serializer.
    pub fn redact(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
        payload: &mut Value,
    ) -> ScopegateResult<()> {
        let access = self.get_allowed_fields_with_access(profile_id, entity_type, action)?;
        let Some(profile) = self.catalog().profile(profile_id)? else {
            return Ok(());
        };
        let schema = self.catalog().entity_schema(entity_type)?;
        ResponseRedactor::new(&access, &profile, schema.as_ref())
            .with_identifier_key(&self.config().identifier_key)
            .redact(payload);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance hooks
    // -----------------------------------------------------------------------
    //
    // Hooks never fail. When the catalog cannot be read to target an
    // invalidation, the whole cache is cleared instead.

    pub fn on_scope_changed(&self, scope_id: Uuid) {
        self.guard("scope changed", self.cache.invalidate_scope(scope_id));
    }

    pub fn on_permission_changed(&self, permission_id: Uuid) {
        self.guard(
            "permission changed",
            self.cache.invalidate_permission(permission_id),
        );
    }

    pub fn on_role_permissions_changed(&self, role_id: Uuid) {
        self.guard("role permissions changed", self.cache.invalidate_role(role_id));
    }

    pub fn on_profile_membership_changed(&self, profile_id: Uuid) {
        self.guard(
            "profile membership changed",
            self.cache.invalidate_profile(profile_id),
        );
    }

    pub fn on_profile_created(&self, profile_id: Uuid) {
        self.guard("profile created", self.cache.seed_profile(profile_id));
    }

    pub fn on_profile_deleted(&self, profile_id: Uuid) {
        self.guard("profile deleted", self.cache.invalidate_profile(profile_id));
    }

    pub fn on_bundle_changed(&self, bundle_id: Uuid) {
        self.guard("bundle changed", self.cache.invalidate_bundle(bundle_id));
    }

    pub fn on_role_created(&self, role_id: Uuid) {
        self.cache.aggregator().invalidate_partitions();
        info!(%role_id, "role created");
    }

    pub fn on_role_deleted(&self, role_id: Uuid) {
        self.cache.aggregator().invalidate_partitions();
        self.guard("role deleted", self.cache.invalidate_role(role_id));
    }

    pub fn on_schema_changed(&self, entity_type: &str) {
        self.guard("schema changed", self.cache.invalidate_schema(entity_type));
    }

    /// Dispatch one catalog event to its hook.
    pub fn apply(&self, event: &CatalogEvent) {
        match event {
            CatalogEvent::ScopeChanged(id) => self.on_scope_changed(*id),
            CatalogEvent::PermissionChanged(id) => self.on_permission_changed(*id),
            CatalogEvent::BundleChanged(id) => self.on_bundle_changed(*id),
            CatalogEvent::RoleCreated(id) => self.on_role_created(*id),
            CatalogEvent::RolePermissionsChanged(id) => self.on_role_permissions_changed(*id),
            CatalogEvent::RoleDeleted(id) => self.on_role_deleted(*id),
            CatalogEvent::ProfileCreated(id) => self.on_profile_created(*id),
            CatalogEvent::ProfileMembershipChanged(id) => {
                self.on_profile_membership_changed(*id)
            }
            CatalogEvent::ProfileDeleted(id) => self.on_profile_deleted(*id),
            CatalogEvent::SchemaChanged(entity_type) => self.on_schema_changed(entity_type),
        }
    }

    pub fn apply_all<'e>(&self, events: impl IntoIterator<Item = &'e CatalogEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    fn guard(&self, hook: &str, result: ScopegateResult<()>) {
        if let Err(e) = result {
            warn!(hook, error = %e, "targeted invalidation failed, clearing cache");
            self.cache.clear();
        }
    }
}

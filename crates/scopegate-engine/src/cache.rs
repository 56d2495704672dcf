//! Tiered permission cache and invalidation orchestration.
//!
//! Tiers, each refreshed on miss:
//!
//! - grant bundle → permission ids
//! - role → permission ids (bundles through the bundle tier)
//! - profile → direct and role permission ids
//! - scope → effective fields
//! - entity type → field bit map
//! - (profile, entity type) → access mask per action
//!
//! Recomputing any entry is a pure function of the catalog, so a refresh
//! racing an invalidation can only store a value that is already current.

use std::collections::{BTreeMap, BTreeSet};

use scopegate_core::cache::{CacheBackend, CacheKeys, CacheValue};
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::ScopegateResult;
use scopegate_core::models::access::{AccessLevel, Action, FieldAccessMap};
use scopegate_core::models::scope::Scope;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::RoleAggregator;
use crate::bitmask::FieldBitmaskCodec;
use crate::config::EngineConfig;
use crate::permissions::PermissionCatalog;
use crate::registry::ScopeRegistry;
use crate::store::CacheStore;

pub struct PermissionCache<S, C> {
    catalog: S,
    store: CacheStore<C>,
    config: EngineConfig,
}

impl<S: CatalogReader, C: CacheBackend> PermissionCache<S, C> {
    pub fn new(catalog: S, backend: C, config: EngineConfig) -> Self {
        let keys = CacheKeys::new(config.key_prefix.clone());
        Self {
            catalog,
            store: CacheStore::new(backend, keys, config.cache_ttl),
            config,
        }
    }

    pub fn catalog(&self) -> &S {
        &self.catalog
    }

    pub fn store(&self) -> &CacheStore<C> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> ScopeRegistry<'_, S> {
        ScopeRegistry::new(&self.catalog).with_max_depth(self.config.max_inheritance_depth)
    }

    pub fn permissions(&self) -> PermissionCatalog<'_, S> {
        PermissionCatalog::new(&self.catalog)
    }

    pub fn aggregator(&self) -> RoleAggregator<'_, S, C> {
        RoleAggregator::new(&self.catalog, &self.store)
    }

    pub fn codec(&self) -> FieldBitmaskCodec<'_, S, C> {
        FieldBitmaskCodec::new(&self.catalog, &self.store)
    }

    fn keys(&self) -> &CacheKeys {
        self.store.keys()
    }

    // -----------------------------------------------------------------------
    // Id tiers
    // -----------------------------------------------------------------------

    /// Permission ids of a grant bundle, `None` when the bundle is gone.
    pub fn bundle_permission_ids(&self, bundle_id: Uuid) -> ScopegateResult<Option<BTreeSet<Uuid>>> {
        let key = self.keys().bundle(bundle_id);
        if let Some(ids) = self.store.ids(&key) {
            return Ok(Some(ids));
        }
        let Some(bundle) = self.catalog.bundle(bundle_id)? else {
            return Ok(None);
        };
        self.store.set(&key, CacheValue::Ids(bundle.permission_ids.clone()));
        Ok(Some(bundle.permission_ids))
    }

    /// Permission ids a role grants. A missing role grants nothing.
    pub fn role_permission_ids(&self, role_id: Uuid) -> ScopegateResult<BTreeSet<Uuid>> {
        let key = self.keys().role(role_id);
        if let Some(ids) = self.store.ids(&key) {
            return Ok(ids);
        }
        let Some(role) = self.catalog.role(role_id)? else {
            warn!(%role_id, "role not found, granting nothing");
            return Ok(BTreeSet::new());
        };
        let ids = self
            .aggregator()
            .permission_ids_with(&role, |bundle_id| self.bundle_permission_ids(bundle_id))?;
        self.store.set(&key, CacheValue::Ids(ids.clone()));
        Ok(ids)
    }

    /// Direct permissions of a profile plus those of every role it holds.
    pub fn profile_permission_ids(&self, profile_id: Uuid) -> ScopegateResult<BTreeSet<Uuid>> {
        let key = self.keys().profile(profile_id);
        if let Some(ids) = self.store.ids(&key) {
            return Ok(ids);
        }
        let Some(profile) = self.catalog.profile(profile_id)? else {
            debug!(%profile_id, "profile not found, no permissions");
            return Ok(BTreeSet::new());
        };
        let mut ids = profile.permission_ids.clone();
        for &role_id in &profile.role_ids {
            ids.extend(self.role_permission_ids(role_id)?);
        }
        info!(profile = %profile.username, count = ids.len(), "cached profile permissions");
        self.store.set(&key, CacheValue::Ids(ids.clone()));
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Derived tiers
    // -----------------------------------------------------------------------

    pub fn scope_fields(&self, scope: &Scope) -> ScopegateResult<BTreeSet<String>> {
        let key = self.keys().scope_fields(scope.id);
        if let Some(fields) = self.store.fields(&key) {
            return Ok(fields);
        }
        let fields = self.registry().get_effective_fields(scope)?;
        self.store.set(&key, CacheValue::Fields(fields.clone()));
        Ok(fields)
    }

    /// Packed access masks of a profile on an entity type, keyed by action.
    pub fn access_masks(
        &self,
        profile_id: Uuid,
        entity_type: &str,
    ) -> ScopegateResult<BTreeMap<Action, u128>> {
        let key = self.keys().access(profile_id, entity_type);
        if let Some(masks) = self.store.masks(&key) {
            return Ok(masks);
        }
        let masks = self.build_access_masks(profile_id, entity_type)?;
        self.store.set(&key, CacheValue::Masks(masks.clone()));
        Ok(masks)
    }

    fn build_access_masks(
        &self,
        profile_id: Uuid,
        entity_type: &str,
    ) -> ScopegateResult<BTreeMap<Action, u128>> {
        // 1. Resolve every permission the profile holds.
        let ids = self.profile_permission_ids(profile_id)?;
        let permissions = self.permissions().permissions(&ids)?;

        // 2. Keep grants on active scopes of this entity type, and take the
        //    highest level per field and action.
        let mut levels: BTreeMap<Action, FieldAccessMap> = BTreeMap::new();
        for permission in permissions {
            let Some(scope) = self.catalog.scope(permission.scope_id)? else {
                warn!(permission_id = %permission.id, scope_id = %permission.scope_id,
                    "permission refers to missing scope");
                continue;
            };
            if !scope.is_active || scope.entity_type != entity_type {
                continue;
            }
            let level = permission.row_access.level();
            let by_field = levels.entry(permission.action).or_default();
            for field in self.scope_fields(&scope)? {
                let current = by_field.entry(field).or_default();
                *current = (*current).max(level);
            }
        }

        // 3. Pack one mask per action.
        let codec = self.codec();
        let mut masks = BTreeMap::new();
        for (action, by_field) in levels {
            let mask = codec.encode(entity_type, &by_field)?;
            if mask != 0 {
                masks.insert(action, mask);
            }
        }
        info!(%profile_id, entity_type, actions = masks.len(), "cached access masks");
        Ok(masks)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Field → access level for one (profile, entity type, action). Empty
    /// means no access.
    pub fn get_allowed_fields_with_access(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<FieldAccessMap> {
        let masks = self.access_masks(profile_id, entity_type)?;
        match masks.get(&action) {
            Some(&mask) => self.codec().decode_fields_with_level(entity_type, mask),
            None => Ok(FieldAccessMap::new()),
        }
    }

    pub fn get_allowed_fields(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<BTreeSet<String>> {
        Ok(self
            .get_allowed_fields_with_access(profile_id, entity_type, action)?
            .into_keys()
            .collect())
    }

    pub fn has_model_permission(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<bool> {
        Ok(self
            .access_masks(profile_id, entity_type)?
            .get(&action)
            .is_some_and(|&mask| mask != 0))
    }

    pub fn get_field_access_level(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
        field: &str,
    ) -> ScopegateResult<AccessLevel> {
        let masks = self.access_masks(profile_id, entity_type)?;
        match masks.get(&action) {
            Some(&mask) => self.codec().field_level(entity_type, mask, field),
            None => Ok(AccessLevel::None),
        }
    }

    /// Whether the profile reaches at least `required` on `field`.
    pub fn has_field_permission(
        &self,
        profile_id: Uuid,
        entity_type: &str,
        action: Action,
        field: &str,
        required: AccessLevel,
    ) -> ScopegateResult<bool> {
        let level = self.get_field_access_level(profile_id, entity_type, action, field)?;
        Ok(level > AccessLevel::None && level >= required)
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Drop the access masks of every profile on `entity_type`.
    pub fn invalidate_entity_type(&self, entity_type: &str) -> ScopegateResult<()> {
        let profile_ids = self.catalog.profile_ids(None)?;
        self.store.purge_access(&profile_ids, entity_type);
        info!(entity_type, profiles = profile_ids.len(), "invalidated access masks");
        Ok(())
    }

    /// Drop the access masks of every profile on every entity type.
    pub fn invalidate_all_access(&self) -> ScopegateResult<()> {
        let entity_types = self.catalog.entity_types()?;
        let profile_ids = self.catalog.profile_ids(None)?;
        let keys: Vec<String> = profile_ids
            .iter()
            .flat_map(|&profile_id| {
                self.keys()
                    .access_of_profile(profile_id, entity_types.iter().map(String::as_str))
            })
            .collect();
        self.store.delete_many(&keys);
        info!(profiles = profile_ids.len(), "invalidated all access masks");
        Ok(())
    }

    /// Profile-tier and access keys of one profile.
    fn profile_keys(&self, profile_id: Uuid, entity_types: &[String], keys: &mut Vec<String>) {
        keys.push(self.keys().profile(profile_id));
        keys.extend(
            self.keys()
                .access_of_profile(profile_id, entity_types.iter().map(String::as_str)),
        );
    }

    /// Role key plus the keys of every holder. Returns the holder count.
    fn role_keys(
        &self,
        role_id: Uuid,
        entity_types: &[String],
        keys: &mut Vec<String>,
    ) -> ScopegateResult<usize> {
        keys.push(self.keys().role(role_id));
        let holders = self.catalog.profiles_with_role(role_id)?;
        for &profile_id in &holders {
            self.profile_keys(profile_id, entity_types, keys);
        }
        Ok(holders.len())
    }

    /// Drop a profile's permission ids and all of its access masks.
    pub fn invalidate_profile(&self, profile_id: Uuid) -> ScopegateResult<()> {
        let entity_types = self.catalog.entity_types()?;
        let mut keys = Vec::with_capacity(entity_types.len() + 1);
        self.profile_keys(profile_id, &entity_types, &mut keys);
        self.store.delete_many(&keys);
        debug!(%profile_id, "invalidated profile permissions");
        Ok(())
    }

    /// A scope was created, changed or deleted.
    pub fn invalidate_scope(&self, scope_id: Uuid) -> ScopegateResult<()> {
        self.store.delete(&self.keys().scope_fields(scope_id));

        let Some(scope) = self.catalog.scope(scope_id)? else {
            // Deleted: its entity type is unknown from here.
            return self.invalidate_all_access();
        };

        let subtree = self.registry().subtree(scope_id)?;
        let keys: Vec<String> = subtree
            .iter()
            .map(|descendant| self.keys().scope_fields(descendant.id))
            .collect();
        self.store.delete_many(&keys);
        self.invalidate_entity_type(&scope.entity_type)?;
        self.codec().update_field_map(&scope.entity_type)?;
        info!(scope = %scope.code, descendants = subtree.len(), "invalidated scope");
        Ok(())
    }

    /// A permission was created, changed or deleted.
    pub fn invalidate_permission(&self, permission_id: Uuid) -> ScopegateResult<()> {
        let entity_type = match self.catalog.permission(permission_id)? {
            Some(permission) => self.permissions().entity_type_of(&permission)?,
            None => None,
        };
        match entity_type {
            Some(entity_type) => self.invalidate_entity_type(&entity_type),
            None => self.invalidate_all_access(),
        }
    }

    /// A role's grants changed: drop the role tier, then every holder.
    pub fn invalidate_role(&self, role_id: Uuid) -> ScopegateResult<()> {
        let entity_types = self.catalog.entity_types()?;
        let mut keys = Vec::new();
        let holders = self.role_keys(role_id, &entity_types, &mut keys)?;
        self.store.delete_many(&keys);
        info!(%role_id, profiles = holders, "invalidated role permissions");
        Ok(())
    }

    /// A bundle's permissions changed: drop it, then every role using it.
    pub fn invalidate_bundle(&self, bundle_id: Uuid) -> ScopegateResult<()> {
        let entity_types = self.catalog.entity_types()?;
        let mut keys = vec![self.keys().bundle(bundle_id)];
        let roles = self.catalog.roles_with_bundle(bundle_id)?;
        for &role_id in &roles {
            self.role_keys(role_id, &entity_types, &mut keys)?;
        }
        self.store.delete_many(&keys);
        info!(%bundle_id, roles = roles.len(), "invalidated bundle permissions");
        Ok(())
    }

    /// Entity schema registered or replaced.
    pub fn invalidate_schema(&self, entity_type: &str) -> ScopegateResult<()> {
        let keys: Vec<String> = self
            .catalog
            .scopes_for_entity_type(entity_type)?
            .iter()
            .map(|scope| self.keys().scope_fields(scope.id))
            .collect();
        self.store.delete_many(&keys);
        self.codec().update_field_map(entity_type)?;
        Ok(())
    }

    /// Seed the profile tier for a new profile.
    pub fn seed_profile(&self, profile_id: Uuid) -> ScopegateResult<()> {
        self.store.delete(&self.keys().profile(profile_id));
        self.profile_permission_ids(profile_id)?;
        Ok(())
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

//! In-memory catalog: validated writes over copy-on-write snapshots.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateError, ScopegateResult, ValidationError};
use scopegate_core::models::{
    bundle::{CreateGrantBundle, GrantBundle, UpdateGrantBundle},
    permission::{CreatePermission, Permission, UpdatePermission},
    profile::{CreateProfile, Profile, ProfileKind, UpdateProfile},
    role::{CreateRole, Role, UpdateRole},
    schema::EntitySchema,
    scope::{CreateScope, Scope, UpdateScope},
};
use tracing::info;
use uuid::Uuid;

use crate::bitmask::bit_map_for;
use crate::events::CatalogEvent;
use crate::permissions::PermissionCatalog;
use crate::registry::{DEFAULT_MAX_DEPTH, ScopeRegistry};
use crate::snapshot::CatalogSnapshot;

/// Result of a write: the stored record and the events to forward to the
/// engine.
#[derive(Debug, Clone)]
pub struct Change<T> {
    pub value: T,
    pub events: Vec<CatalogEvent>,
}

impl<T> Change<T> {
    fn new(value: T, events: Vec<CatalogEvent>) -> Self {
        Self { value, events }
    }
}

/// Catalog held in memory as a sequence of immutable snapshots.
///
/// Readers load the current snapshot without locking. Writers serialize on
/// a mutex, validate against a private copy and publish it whole, so a
/// reader never sees a half-applied change.
pub struct InMemoryCatalog {
    snapshot: ArcSwap<CatalogSnapshot>,
    writer: Mutex<()>,
    max_depth: usize,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new(CatalogSnapshot::default())
    }
}

impl InMemoryCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_inheritance_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.load_full()
    }

    /// Swap in a snapshot loaded elsewhere. Every cache built on the old
    /// one must be cleared by the caller.
    pub fn replace(&self, snapshot: CatalogSnapshot) {
        let _guard = self.writer.lock();
        self.snapshot.store(Arc::new(snapshot));
        info!("catalog snapshot replaced");
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut CatalogSnapshot, &mut Vec<CatalogEvent>) -> ScopegateResult<T>,
    ) -> ScopegateResult<Change<T>> {
        let _guard = self.writer.lock();
        let mut draft = CatalogSnapshot::clone(&self.snapshot.load());
        let mut events = Vec::new();
        let value = f(&mut draft, &mut events)?;
        self.snapshot.store(Arc::new(draft));
        Ok(Change::new(value, events))
    }

    fn registry<'s>(&self, draft: &'s CatalogSnapshot) -> ScopeRegistry<'s, CatalogSnapshot> {
        ScopeRegistry::new(draft).with_max_depth(self.max_depth)
    }

    // -----------------------------------------------------------------------
    // Schemas
    // -----------------------------------------------------------------------

    /// Register or replace the schema of an entity type. Existing scopes of
    /// that type must still name only declared fields.
    pub fn register_schema(&self, schema: EntitySchema) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            bit_map_for(&schema)?;
            let entity_type = schema.entity_type.clone();
            draft.register_schema(schema);

            let registry = self.registry(draft);
            for scope in draft.scopes_for_entity_type(&entity_type)? {
                registry.validate(&scope)?;
            }
            events.push(CatalogEvent::SchemaChanged(entity_type));
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    pub fn create_scope(&self, input: CreateScope) -> ScopegateResult<Change<Scope>> {
        self.insert_scope(Scope::from(input))
    }

    /// Store a fully built scope, id included.
    pub fn insert_scope(&self, scope: Scope) -> ScopegateResult<Change<Scope>> {
        self.write(|draft, events| {
            if draft.scope_by_code(&scope.code)?.is_some() {
                return Err(duplicate("scope", &scope.code));
            }
            self.registry(draft).validate(&scope)?;
            draft.scopes.insert(scope.id, scope.clone());
            events.push(CatalogEvent::ScopeChanged(scope.id));
            Ok(scope)
        })
    }

    pub fn update_scope(&self, id: Uuid, input: UpdateScope) -> ScopegateResult<Change<Scope>> {
        self.write(|draft, events| {
            let mut scope = draft.scope(id)?.ok_or_else(|| ScopegateError::not_found("scope", id))?;
            input.apply_to(&mut scope);
            self.registry(draft).validate(&scope)?;
            draft.scopes.insert(id, scope.clone());
            events.push(CatalogEvent::ScopeChanged(id));
            Ok(scope)
        })
    }

    /// Delete a leaf scope together with the permissions defined on it.
    pub fn delete_scope(&self, id: Uuid) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            let scope = draft.scope(id)?.ok_or_else(|| ScopegateError::not_found("scope", id))?;
            if !draft.child_scopes(id)?.is_empty() {
                return Err(ValidationError::ScopeHasChildren { scope: scope.code }.into());
            }
            let removed: BTreeSet<Uuid> = draft
                .permissions_for_scope(id)?
                .into_iter()
                .map(|p| p.id)
                .collect();
            draft.permissions.retain(|pid, _| !removed.contains(pid));
            draft.scopes.remove(&id);

            events.push(CatalogEvent::ScopeChanged(id));
            for &pid in &removed {
                events.push(CatalogEvent::PermissionChanged(pid));
            }
            detach_permissions(draft, &removed, events);
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    pub fn create_permission(&self, input: CreatePermission) -> ScopegateResult<Change<Permission>> {
        self.insert_permission(Permission::from(input))
    }

    pub fn insert_permission(&self, permission: Permission) -> ScopegateResult<Change<Permission>> {
        self.write(|draft, events| {
            draft.require_scope(permission.scope_id)?;
            PermissionCatalog::new(&*draft).ensure_unique(
                permission.scope_id,
                permission.action,
                permission.row_access,
                None,
            )?;
            draft.permissions.insert(permission.id, permission.clone());
            events.push(CatalogEvent::PermissionChanged(permission.id));
            Ok(permission)
        })
    }

    pub fn update_permission(
        &self,
        id: Uuid,
        input: UpdatePermission,
    ) -> ScopegateResult<Change<Permission>> {
        self.write(|draft, events| {
            let mut permission = draft
                .permission(id)?
                .ok_or_else(|| ScopegateError::not_found("permission", id))?;
            let previous_scope = permission.scope_id;
            input.apply_to(&mut permission);

            draft.require_scope(permission.scope_id)?;
            PermissionCatalog::new(&*draft).ensure_unique(
                permission.scope_id,
                permission.action,
                permission.row_access,
                Some(id),
            )?;
            draft.permissions.insert(id, permission.clone());

            events.push(CatalogEvent::PermissionChanged(id));
            if previous_scope != permission.scope_id {
                // Masks of the old scope's entity type still carry the grant.
                events.push(CatalogEvent::ScopeChanged(previous_scope));
            }
            Ok(permission)
        })
    }

    /// Delete a permission and drop it from every bundle, role and profile.
    pub fn delete_permission(&self, id: Uuid) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            if draft.permissions.remove(&id).is_none() {
                return Err(ScopegateError::not_found("permission", id));
            }
            events.push(CatalogEvent::PermissionChanged(id));
            detach_permissions(draft, &BTreeSet::from([id]), events);
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Grant bundles
    // -----------------------------------------------------------------------

    pub fn create_bundle(&self, input: CreateGrantBundle) -> ScopegateResult<Change<GrantBundle>> {
        self.write(|draft, events| {
            if draft.bundles.values().any(|b| b.name == input.name) {
                return Err(duplicate("grant bundle", &input.name));
            }
            draft.require_permissions(&input.permission_ids)?;
            let bundle = GrantBundle::from(input);
            draft.bundles.insert(bundle.id, bundle.clone());
            events.push(CatalogEvent::BundleChanged(bundle.id));
            Ok(bundle)
        })
    }

    pub fn update_bundle(
        &self,
        id: Uuid,
        input: UpdateGrantBundle,
    ) -> ScopegateResult<Change<GrantBundle>> {
        self.write(|draft, events| {
            let mut bundle = draft
                .bundle(id)?
                .ok_or_else(|| ScopegateError::not_found("grant bundle", id))?;
            if let Some(name) = &input.name {
                if draft.bundles.values().any(|b| &b.name == name && b.id != id) {
                    return Err(duplicate("grant bundle", name));
                }
            }
            if let Some(ids) = &input.permission_ids {
                draft.require_permissions(ids)?;
            }
            input.apply_to(&mut bundle);
            draft.bundles.insert(id, bundle.clone());
            events.push(CatalogEvent::BundleChanged(id));
            Ok(bundle)
        })
    }

    pub fn delete_bundle(&self, id: Uuid) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            if draft.bundles.remove(&id).is_none() {
                return Err(ScopegateError::not_found("grant bundle", id));
            }
            // Roles first: the bundle hook cascades through roles_with_bundle,
            // which no longer finds them once the bundle is detached.
            for role in draft.roles.values_mut() {
                if role.bundle_ids.remove(&id) {
                    events.push(CatalogEvent::RolePermissionsChanged(role.id));
                }
            }
            events.push(CatalogEvent::BundleChanged(id));
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    pub fn create_role(&self, input: CreateRole) -> ScopegateResult<Change<Role>> {
        self.insert_role(Role::from(input))
    }

    pub fn insert_role(&self, role: Role) -> ScopegateResult<Change<Role>> {
        self.write(|draft, events| {
            if draft.roles.values().any(|r| r.name == role.name) {
                return Err(duplicate("role", &role.name));
            }
            draft.require_permissions(&role.permission_ids)?;
            draft.require_bundles(&role.bundle_ids)?;
            draft.roles.insert(role.id, role.clone());
            events.push(CatalogEvent::RoleCreated(role.id));
            Ok(role)
        })
    }

    pub fn update_role(&self, id: Uuid, input: UpdateRole) -> ScopegateResult<Change<Role>> {
        self.write(|draft, events| {
            let mut role = draft.role(id)?.ok_or_else(|| ScopegateError::not_found("role", id))?;
            if let Some(name) = &input.name {
                if draft.roles.values().any(|r| &r.name == name && r.id != id) {
                    return Err(duplicate("role", name));
                }
            }
            if let Some(ids) = &input.permission_ids {
                draft.require_permissions(ids)?;
            }
            if let Some(ids) = &input.bundle_ids {
                draft.require_bundles(ids)?;
            }
            let changes_grants = input.changes_grants();
            input.apply_to(&mut role);
            draft.roles.insert(id, role.clone());
            if changes_grants {
                events.push(CatalogEvent::RolePermissionsChanged(id));
            }
            Ok(role)
        })
    }

    /// Delete a role and take it away from every profile holding it.
    pub fn delete_role(&self, id: Uuid) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            if draft.roles.remove(&id).is_none() {
                return Err(ScopegateError::not_found("role", id));
            }
            events.push(CatalogEvent::RoleDeleted(id));
            for profile in draft.profiles.values_mut() {
                if profile.role_ids.remove(&id) {
                    events.push(CatalogEvent::ProfileMembershipChanged(profile.id));
                }
            }
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    pub fn create_profile(&self, input: CreateProfile) -> ScopegateResult<Change<Profile>> {
        self.insert_profile(Profile::from(input))
    }

    pub fn insert_profile(&self, profile: Profile) -> ScopegateResult<Change<Profile>> {
        self.write(|draft, events| {
            if draft
                .profiles
                .values()
                .any(|p| p.kind == profile.kind && p.username == profile.username)
            {
                return Err(duplicate("profile", &profile.username));
            }
            draft.check_profile(&profile)?;
            draft.profiles.insert(profile.id, profile.clone());
            events.push(CatalogEvent::ProfileCreated(profile.id));
            Ok(profile)
        })
    }

    pub fn update_profile(&self, id: Uuid, input: UpdateProfile) -> ScopegateResult<Change<Profile>> {
        self.write(|draft, events| {
            let mut profile = draft
                .profile(id)?
                .ok_or_else(|| ScopegateError::not_found("profile", id))?;
            let changes_membership = input.changes_membership();
            input.apply_to(&mut profile);
            draft.check_profile(&profile)?;
            draft.profiles.insert(id, profile.clone());
            if changes_membership {
                events.push(CatalogEvent::ProfileMembershipChanged(id));
            }
            Ok(profile)
        })
    }

    pub fn delete_profile(&self, id: Uuid) -> ScopegateResult<Change<()>> {
        self.write(|draft, events| {
            if draft.profiles.remove(&id).is_none() {
                return Err(ScopegateError::not_found("profile", id));
            }
            events.push(CatalogEvent::ProfileDeleted(id));
            Ok(())
        })
    }
}

fn duplicate(entity: &'static str, name: &str) -> ScopegateError {
    ValidationError::DuplicateName {
        entity,
        name: name.to_string(),
    }
    .into()
}

/// Remove `removed` permission ids from every holder, recording one event
/// per holder touched.
fn detach_permissions(
    draft: &mut CatalogSnapshot,
    removed: &BTreeSet<Uuid>,
    events: &mut Vec<CatalogEvent>,
) {
    if removed.is_empty() {
        return;
    }
    for bundle in draft.bundles.values_mut() {
        let before = bundle.permission_ids.len();
        bundle.permission_ids.retain(|id| !removed.contains(id));
        if bundle.permission_ids.len() != before {
            events.push(CatalogEvent::BundleChanged(bundle.id));
        }
    }
    for role in draft.roles.values_mut() {
        let before = role.permission_ids.len();
        role.permission_ids.retain(|id| !removed.contains(id));
        if role.permission_ids.len() != before {
            events.push(CatalogEvent::RolePermissionsChanged(role.id));
        }
    }
    for profile in draft.profiles.values_mut() {
        let before = profile.permission_ids.len();
        profile.permission_ids.retain(|id| !removed.contains(id));
        if profile.permission_ids.len() != before {
            events.push(CatalogEvent::ProfileMembershipChanged(profile.id));
        }
    }
}

// ---------------------------------------------------------------------------
// Reads go to the current snapshot.
// ---------------------------------------------------------------------------

impl CatalogReader for InMemoryCatalog {
    fn scope(&self, id: Uuid) -> ScopegateResult<Option<Scope>> {
        self.snapshot.load().scope(id)
    }
    fn scope_by_code(&self, code: &str) -> ScopegateResult<Option<Scope>> {
        self.snapshot.load().scope_by_code(code)
    }
    fn scopes_for_entity_type(&self, entity_type: &str) -> ScopegateResult<Vec<Scope>> {
        self.snapshot.load().scopes_for_entity_type(entity_type)
    }
    fn child_scopes(&self, parent_id: Uuid) -> ScopegateResult<Vec<Scope>> {
        self.snapshot.load().child_scopes(parent_id)
    }
    fn permission(&self, id: Uuid) -> ScopegateResult<Option<Permission>> {
        self.snapshot.load().permission(id)
    }
    fn permissions_for_scope(&self, scope_id: Uuid) -> ScopegateResult<Vec<Permission>> {
        self.snapshot.load().permissions_for_scope(scope_id)
    }
    fn bundle(&self, id: Uuid) -> ScopegateResult<Option<GrantBundle>> {
        self.snapshot.load().bundle(id)
    }
    fn role(&self, id: Uuid) -> ScopegateResult<Option<Role>> {
        self.snapshot.load().role(id)
    }
    fn roles(&self) -> ScopegateResult<Vec<Role>> {
        self.snapshot.load().roles()
    }
    fn roles_with_bundle(&self, bundle_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        self.snapshot.load().roles_with_bundle(bundle_id)
    }
    fn profile(&self, id: Uuid) -> ScopegateResult<Option<Profile>> {
        self.snapshot.load().profile(id)
    }
    fn profile_ids(&self, kind: Option<ProfileKind>) -> ScopegateResult<Vec<Uuid>> {
        self.snapshot.load().profile_ids(kind)
    }
    fn profiles_with_role(&self, role_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        self.snapshot.load().profiles_with_role(role_id)
    }
    fn entity_schema(&self, entity_type: &str) -> ScopegateResult<Option<EntitySchema>> {
        self.snapshot.load().entity_schema(entity_type)
    }
    fn entity_types(&self) -> ScopegateResult<Vec<String>> {
        self.snapshot.load().entity_types()
    }
}

//! Synchronous read interface over the access-control catalog.
//!
//! The engine resolves permissions on the request path and never awaits,
//! so it reads the catalog through this trait rather than through the async
//! repositories. Implementations are expected to serve from memory (see the
//! in-memory catalog in `scopegate-engine`, which `scopegate-db` can fill).

use uuid::Uuid;

use crate::error::ScopegateResult;
use crate::models::{
    bundle::GrantBundle,
    permission::Permission,
    profile::{Profile, ProfileKind},
    role::Role,
    schema::EntitySchema,
    scope::Scope,
};

/// Lookups return `Ok(None)` for a missing record. Errors are reserved for
/// a catalog that cannot be read at all.
pub trait CatalogReader: Send + Sync {
    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    fn scope(&self, id: Uuid) -> ScopegateResult<Option<Scope>>;
    fn scope_by_code(&self, code: &str) -> ScopegateResult<Option<Scope>>;
    fn scopes_for_entity_type(&self, entity_type: &str) -> ScopegateResult<Vec<Scope>>;
    /// Direct children of a scope, active or not.
    fn child_scopes(&self, parent_id: Uuid) -> ScopegateResult<Vec<Scope>>;

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    fn permission(&self, id: Uuid) -> ScopegateResult<Option<Permission>>;
    fn permissions_for_scope(&self, scope_id: Uuid) -> ScopegateResult<Vec<Permission>>;

    // -----------------------------------------------------------------------
    // Bundles & roles
    // -----------------------------------------------------------------------

    fn bundle(&self, id: Uuid) -> ScopegateResult<Option<GrantBundle>>;
    fn role(&self, id: Uuid) -> ScopegateResult<Option<Role>>;
    fn roles(&self) -> ScopegateResult<Vec<Role>>;
    fn roles_with_bundle(&self, bundle_id: Uuid) -> ScopegateResult<Vec<Uuid>>;

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    fn profile(&self, id: Uuid) -> ScopegateResult<Option<Profile>>;
    fn profile_ids(&self, kind: Option<ProfileKind>) -> ScopegateResult<Vec<Uuid>>;
    fn profiles_with_role(&self, role_id: Uuid) -> ScopegateResult<Vec<Uuid>>;

    // -----------------------------------------------------------------------
    // Schemas
    // -----------------------------------------------------------------------

    fn entity_schema(&self, entity_type: &str) -> ScopegateResult<Option<EntitySchema>>;
    fn entity_types(&self) -> ScopegateResult<Vec<String>>;
}

impl<T: CatalogReader + ?Sized> CatalogReader for std::sync::Arc<T> {
    fn scope(&self, id: Uuid) -> ScopegateResult<Option<Scope>> {
        (**self).scope(id)
    }
    fn scope_by_code(&self, code: &str) -> ScopegateResult<Option<Scope>> {
        (**self).scope_by_code(code)
    }
    fn scopes_for_entity_type(&self, entity_type: &str) -> ScopegateResult<Vec<Scope>> {
        (**self).scopes_for_entity_type(entity_type)
    }
    fn child_scopes(&self, parent_id: Uuid) -> ScopegateResult<Vec<Scope>> {
        (**self).child_scopes(parent_id)
    }
    fn permission(&self, id: Uuid) -> ScopegateResult<Option<Permission>> {
        (**self).permission(id)
    }
    fn permissions_for_scope(&self, scope_id: Uuid) -> ScopegateResult<Vec<Permission>> {
        (**self).permissions_for_scope(scope_id)
    }
    fn bundle(&self, id: Uuid) -> ScopegateResult<Option<GrantBundle>> {
        (**self).bundle(id)
    }
    fn role(&self, id: Uuid) -> ScopegateResult<Option<Role>> {
        (**self).role(id)
    }
    fn roles(&self) -> ScopegateResult<Vec<Role>> {
        (**self).roles()
    }
    fn roles_with_bundle(&self, bundle_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        (**self).roles_with_bundle(bundle_id)
    }
    fn profile(&self, id: Uuid) -> ScopegateResult<Option<Profile>> {
        (**self).profile(id)
    }
    fn profile_ids(&self, kind: Option<ProfileKind>) -> ScopegateResult<Vec<Uuid>> {
        (**self).profile_ids(kind)
    }
    fn profiles_with_role(&self, role_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        (**self).profiles_with_role(role_id)
    }
    fn entity_schema(&self, entity_type: &str) -> ScopegateResult<Option<EntitySchema>> {
        (**self).entity_schema(entity_type)
    }
    fn entity_types(&self) -> ScopegateResult<Vec<String>> {
        (**self).entity_types()
    }
}

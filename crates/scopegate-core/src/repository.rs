//! Repository trait definitions for catalog persistence.
//!
//! All repository operations are async. Write paths return the stored
//! record; callers forward the matching catalog event to the engine so it
//! can invalidate its caches.

use uuid::Uuid;

use crate::error::ScopegateResult;
use crate::models::{
    bundle::{CreateGrantBundle, GrantBundle, UpdateGrantBundle},
    permission::{CreatePermission, Permission, UpdatePermission},
    profile::{CreateProfile, Profile, ProfileKind, UpdateProfile},
    role::{CreateRole, Role, UpdateRole},
    scope::{CreateScope, Scope, UpdateScope},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Scopes & permissions
// ---------------------------------------------------------------------------

pub trait ScopeRepository: Send + Sync {
    fn create(&self, input: CreateScope) -> impl Future<Output = ScopegateResult<Scope>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ScopegateResult<Scope>> + Send;
    fn get_by_code(&self, code: &str) -> impl Future<Output = ScopegateResult<Scope>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateScope,
    ) -> impl Future<Output = ScopegateResult<Scope>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ScopegateResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ScopegateResult<PaginatedResult<Scope>>> + Send;
    /// Every scope, for snapshot loading.
    fn all(&self) -> impl Future<Output = ScopegateResult<Vec<Scope>>> + Send;
}

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = ScopegateResult<Permission>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ScopegateResult<Permission>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdatePermission,
    ) -> impl Future<Output = ScopegateResult<Permission>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ScopegateResult<()>> + Send;
    fn list_by_scope(
        &self,
        scope_id: Uuid,
    ) -> impl Future<Output = ScopegateResult<Vec<Permission>>> + Send;
    fn all(&self) -> impl Future<Output = ScopegateResult<Vec<Permission>>> + Send;
}

// ---------------------------------------------------------------------------
// Grant bundles & roles
// ---------------------------------------------------------------------------

pub trait GrantBundleRepository: Send + Sync {
    fn create(
        &self,
        input: CreateGrantBundle,
    ) -> impl Future<Output = ScopegateResult<GrantBundle>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ScopegateResult<GrantBundle>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateGrantBundle,
    ) -> impl Future<Output = ScopegateResult<GrantBundle>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ScopegateResult<()>> + Send;
    fn all(&self) -> impl Future<Output = ScopegateResult<Vec<GrantBundle>>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = ScopegateResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ScopegateResult<Role>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateRole,
    ) -> impl Future<Output = ScopegateResult<Role>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ScopegateResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ScopegateResult<PaginatedResult<Role>>> + Send;
    fn all(&self) -> impl Future<Output = ScopegateResult<Vec<Role>>> + Send;
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

pub trait ProfileRepository: Send + Sync {
    fn create(
        &self,
        input: CreateProfile,
    ) -> impl Future<Output = ScopegateResult<Profile>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ScopegateResult<Profile>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateProfile,
    ) -> impl Future<Output = ScopegateResult<Profile>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ScopegateResult<()>> + Send;
    fn list(
        &self,
        kind: Option<ProfileKind>,
        pagination: Pagination,
    ) -> impl Future<Output = ScopegateResult<PaginatedResult<Profile>>> + Send;
    fn all(&self) -> impl Future<Output = ScopegateResult<Vec<Profile>>> + Send;
}

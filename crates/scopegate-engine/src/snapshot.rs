//! Immutable, serializable view of the whole catalog.

use std::collections::{BTreeMap, BTreeSet};

use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateError, ScopegateResult, ValidationError};
use scopegate_core::models::{
    bundle::GrantBundle,
    permission::Permission,
    profile::{Profile, ProfileKind},
    role::Role,
    schema::{EntitySchema, SchemaRegistry},
    scope::Scope,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every catalog record, indexed by id. Serialized as plain lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CatalogDocument", into = "CatalogDocument")]
pub struct CatalogSnapshot {
    pub scopes: BTreeMap<Uuid, Scope>,
    pub permissions: BTreeMap<Uuid, Permission>,
    pub bundles: BTreeMap<Uuid, GrantBundle>,
    pub roles: BTreeMap<Uuid, Role>,
    pub profiles: BTreeMap<Uuid, Profile>,
    pub schemas: SchemaRegistry,
}

/// On-disk layout of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub schemas: Vec<EntitySchema>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub bundles: Vec<GrantBundle>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

impl From<CatalogDocument> for CatalogSnapshot {
    fn from(doc: CatalogDocument) -> Self {
        Self {
            scopes: doc.scopes.into_iter().map(|s| (s.id, s)).collect(),
            permissions: doc.permissions.into_iter().map(|p| (p.id, p)).collect(),
            bundles: doc.bundles.into_iter().map(|b| (b.id, b)).collect(),
            roles: doc.roles.into_iter().map(|r| (r.id, r)).collect(),
            profiles: doc.profiles.into_iter().map(|p| (p.id, p)).collect(),
            schemas: doc.schemas.into_iter().collect(),
        }
    }
}

impl From<CatalogSnapshot> for CatalogDocument {
    fn from(snapshot: CatalogSnapshot) -> Self {
        Self {
            schemas: snapshot.schemas.iter().cloned().collect(),
            scopes: snapshot.scopes.into_values().collect(),
            permissions: snapshot.permissions.into_values().collect(),
            bundles: snapshot.bundles.into_values().collect(),
            roles: snapshot.roles.into_values().collect(),
            profiles: snapshot.profiles.into_values().collect(),
        }
    }
}

impl CatalogSnapshot {
    pub fn register_schema(&mut self, schema: EntitySchema) -> Option<EntitySchema> {
        self.schemas.register(schema)
    }

    // -----------------------------------------------------------------------
    // Reference checks shared by the write paths
    // -----------------------------------------------------------------------

    pub fn require_scope(&self, id: Uuid) -> ScopegateResult<()> {
        if self.scopes.contains_key(&id) {
            Ok(())
        } else {
            Err(ScopegateError::not_found("scope", id))
        }
    }

    pub fn require_permissions(&self, ids: &BTreeSet<Uuid>) -> ScopegateResult<()> {
        match ids.iter().find(|id| !self.permissions.contains_key(id)) {
            Some(id) => Err(ScopegateError::not_found("permission", id)),
            None => Ok(()),
        }
    }

    pub fn require_bundles(&self, ids: &BTreeSet<Uuid>) -> ScopegateResult<()> {
        match ids.iter().find(|id| !self.bundles.contains_key(id)) {
            Some(id) => Err(ScopegateError::not_found("grant bundle", id)),
            None => Ok(()),
        }
    }

    /// Profile type must be known to the variant, grants must exist, and a
    /// member may not hold staff-only roles.
    pub fn check_profile(&self, profile: &Profile) -> ScopegateResult<()> {
        if profile.rank().is_none() {
            return Err(ValidationError::UnknownValue {
                kind: "profile type",
                value: profile.profile_type.clone(),
            }
            .into());
        }
        self.require_permissions(&profile.permission_ids)?;
        for role_id in &profile.role_ids {
            let role = self
                .roles
                .get(role_id)
                .ok_or_else(|| ScopegateError::not_found("role", role_id))?;
            if role.staff_only && profile.kind == ProfileKind::Member {
                return Err(ValidationError::RoleNotAssignable {
                    role: role.name.clone(),
                    profile: profile.username.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

impl CatalogReader for CatalogSnapshot {
    fn scope(&self, id: Uuid) -> ScopegateResult<Option<Scope>> {
        Ok(self.scopes.get(&id).cloned())
    }

    fn scope_by_code(&self, code: &str) -> ScopegateResult<Option<Scope>> {
        Ok(self.scopes.values().find(|s| s.code == code).cloned())
    }

    fn scopes_for_entity_type(&self, entity_type: &str) -> ScopegateResult<Vec<Scope>> {
        Ok(self
            .scopes
            .values()
            .filter(|s| s.entity_type == entity_type)
            .cloned()
            .collect())
    }

    fn child_scopes(&self, parent_id: Uuid) -> ScopegateResult<Vec<Scope>> {
        Ok(self
            .scopes
            .values()
            .filter(|s| s.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    fn permission(&self, id: Uuid) -> ScopegateResult<Option<Permission>> {
        Ok(self.permissions.get(&id).cloned())
    }

    fn permissions_for_scope(&self, scope_id: Uuid) -> ScopegateResult<Vec<Permission>> {
        Ok(self
            .permissions
            .values()
            .filter(|p| p.scope_id == scope_id)
            .cloned()
            .collect())
    }

    fn bundle(&self, id: Uuid) -> ScopegateResult<Option<GrantBundle>> {
        Ok(self.bundles.get(&id).cloned())
    }

    fn role(&self, id: Uuid) -> ScopegateResult<Option<Role>> {
        Ok(self.roles.get(&id).cloned())
    }

    fn roles(&self) -> ScopegateResult<Vec<Role>> {
        Ok(self.roles.values().cloned().collect())
    }

    fn roles_with_bundle(&self, bundle_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        Ok(self
            .roles
            .values()
            .filter(|r| r.bundle_ids.contains(&bundle_id))
            .map(|r| r.id)
            .collect())
    }

    fn profile(&self, id: Uuid) -> ScopegateResult<Option<Profile>> {
        Ok(self.profiles.get(&id).cloned())
    }

    fn profile_ids(&self, kind: Option<ProfileKind>) -> ScopegateResult<Vec<Uuid>> {
        Ok(self
            .profiles
            .values()
            .filter(|p| kind.is_none_or(|k| p.kind == k))
            .map(|p| p.id)
            .collect())
    }

    fn profiles_with_role(&self, role_id: Uuid) -> ScopegateResult<Vec<Uuid>> {
        Ok(self
            .profiles
            .values()
            .filter(|p| p.role_ids.contains(&role_id))
            .map(|p| p.id)
            .collect())
    }

    fn entity_schema(&self, entity_type: &str) -> ScopegateResult<Option<EntitySchema>> {
        Ok(self.schemas.get(entity_type).cloned())
    }

    fn entity_types(&self) -> ScopegateResult<Vec<String>> {
        Ok(self.schemas.entity_types().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_lists() {
        let mut snapshot = CatalogSnapshot::default();
        snapshot.register_schema(EntitySchema::new("member").fields(["id"]));
        let scope = Scope::new("member_basic", "member").including(["id"]);
        snapshot.scopes.insert(scope.id, scope.clone());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["scopes"][0]["code"], "member_basic");
        assert_eq!(json["schemas"][0]["entity_type"], "member");

        let back: CatalogSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn lookups_by_relation() {
        let mut snapshot = CatalogSnapshot::default();
        let parent = Scope::new("p", "member");
        let child = Scope::new("c", "member").with_parent(parent.id);
        let role = Role::new("r");
        let profile = Profile::member("m").with_roles([role.id]);
        snapshot.scopes.insert(parent.id, parent.clone());
        snapshot.scopes.insert(child.id, child.clone());
        snapshot.roles.insert(role.id, role.clone());
        snapshot.profiles.insert(profile.id, profile.clone());

        assert_eq!(snapshot.child_scopes(parent.id).unwrap(), vec![child]);
        assert_eq!(snapshot.profiles_with_role(role.id).unwrap(), vec![profile.id]);
        assert!(snapshot.profile_ids(Some(ProfileKind::Staff)).unwrap().is_empty());
        assert_eq!(snapshot.scope_by_code("p").unwrap(), Some(parent));
    }
}

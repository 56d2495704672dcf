//! Lookup of (scope, action, row access) grants.

use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::access::{Action, RowAccess};
use scopegate_core::models::permission::Permission;
use tracing::debug;
use uuid::Uuid;

pub struct PermissionCatalog<'a, S: ?Sized> {
    catalog: &'a S,
}

impl<'a, S: CatalogReader + ?Sized> PermissionCatalog<'a, S> {
    pub fn new(catalog: &'a S) -> Self {
        Self { catalog }
    }

    /// Permissions on `scope_id` granting `action`. Empty when none match.
    pub fn permissions_for(&self, scope_id: Uuid, action: Action) -> ScopegateResult<Vec<Permission>> {
        let mut permissions = self.catalog.permissions_for_scope(scope_id)?;
        permissions.retain(|p| p.action == action);
        Ok(permissions)
    }

    /// Permissions granting `action` on any scope of `entity_type`.
    pub fn permissions_for_entity_type(
        &self,
        entity_type: &str,
        action: Action,
    ) -> ScopegateResult<Vec<Permission>> {
        let mut found = Vec::new();
        for scope in self.catalog.scopes_for_entity_type(entity_type)? {
            found.extend(self.permissions_for(scope.id, action)?);
        }
        Ok(found)
    }

    /// Load the permissions behind `ids`, skipping ids that no longer exist.
    pub fn permissions<'i>(
        &self,
        ids: impl IntoIterator<Item = &'i Uuid>,
    ) -> ScopegateResult<Vec<Permission>> {
        let mut found = Vec::new();
        for &id in ids {
            match self.catalog.permission(id)? {
                Some(permission) => found.push(permission),
                None => debug!(permission_id = %id, "skipping dangling permission id"),
            }
        }
        Ok(found)
    }

    /// Fail when another permission already grants the same triple.
    /// `except` names the permission being updated.
    pub fn ensure_unique(
        &self,
        scope_id: Uuid,
        action: Action,
        row_access: RowAccess,
        except: Option<Uuid>,
    ) -> ScopegateResult<()> {
        let clash = self
            .catalog
            .permissions_for_scope(scope_id)?
            .into_iter()
            .any(|p| p.action == action && p.row_access == row_access && Some(p.id) != except);
        if clash {
            return Err(ValidationError::DuplicatePermission {
                scope_id,
                action,
                row_access,
            }
            .into());
        }
        Ok(())
    }

    /// Entity type a permission applies to, through its scope.
    pub fn entity_type_of(&self, permission: &Permission) -> ScopegateResult<Option<String>> {
        Ok(self
            .catalog
            .scope(permission.scope_id)?
            .map(|scope| scope.entity_type))
    }
}

#[cfg(test)]
mod tests {
    use scopegate_core::models::scope::Scope;

    use super::*;
    use crate::snapshot::CatalogSnapshot;

    fn fixture() -> (CatalogSnapshot, Scope, Permission, Permission) {
        let mut c = CatalogSnapshot::default();
        let scope = Scope::new("member_all", "member");
        let get_own = Permission::new(scope.id, Action::Get, RowAccess::Own);
        let update_own = Permission::new(scope.id, Action::Update, RowAccess::Own);
        c.scopes.insert(scope.id, scope.clone());
        c.permissions.insert(get_own.id, get_own.clone());
        c.permissions.insert(update_own.id, update_own.clone());
        (c, scope, get_own, update_own)
    }

    #[test]
    fn filters_by_action() {
        let (c, scope, get_own, _) = fixture();
        let catalog = PermissionCatalog::new(&c);

        assert_eq!(catalog.permissions_for(scope.id, Action::Get).unwrap(), vec![get_own]);
        assert!(catalog.permissions_for(scope.id, Action::Export).unwrap().is_empty());
        assert_eq!(
            catalog
                .permissions_for_entity_type("member", Action::Update)
                .unwrap()
                .len(),
            1
        );
        assert!(
            catalog
                .permissions_for_entity_type("staff", Action::Update)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn dangling_ids_are_skipped() {
        let (c, _, get_own, _) = fixture();
        let ids = [get_own.id, Uuid::new_v4()];
        let found = PermissionCatalog::new(&c).permissions(&ids).unwrap();
        assert_eq!(found, vec![get_own]);
    }

    #[test]
    fn uniqueness_ignores_the_updated_permission() {
        let (c, scope, get_own, _) = fixture();
        let catalog = PermissionCatalog::new(&c);

        assert!(
            catalog
                .ensure_unique(scope.id, Action::Get, RowAccess::Own, None)
                .is_err()
        );
        assert!(
            catalog
                .ensure_unique(scope.id, Action::Get, RowAccess::Own, Some(get_own.id))
                .is_ok()
        );
        assert!(
            catalog
                .ensure_unique(scope.id, Action::Get, RowAccess::All, None)
                .is_ok()
        );
    }
}

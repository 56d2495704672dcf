//! The default member/staff catalog.

use scopegate_core::error::{ScopegateError, ScopegateResult};
use scopegate_core::models::access::{Action, RowAccess};
use scopegate_core::models::permission::Permission;
use scopegate_core::models::profile::{Profile, ProfileKind};
use scopegate_core::models::role::Role;
use scopegate_core::models::schema::{EntitySchema, FieldDef, Hierarchy, Ownership};
use scopegate_core::models::scope::Scope;
use uuid::Uuid;

use crate::memory::InMemoryCatalog;
use crate::snapshot::CatalogSnapshot;

pub fn member_schema() -> EntitySchema {
    EntitySchema::new("member")
        .fields([
            "id",
            "username",
            "email",
            "full_name",
            "type",
            "is_active",
            "created_at",
            "updated_at",
        ])
        .field(FieldDef::hidden("password"))
        .field(FieldDef::aliased("_phone", "phone"))
        .field(FieldDef::aliased("_national_id", "national_id"))
        .with_hierarchy(Hierarchy::new(
            "type",
            ProfileKind::Member.type_ranks().iter().copied(),
        ))
        .owned_by(Ownership::SelfReferencing)
}

pub fn staff_schema() -> EntitySchema {
    EntitySchema::new("staff")
        .fields([
            "id",
            "username",
            "email",
            "type",
            "is_active",
            "created_at",
            "updated_at",
        ])
        .field(FieldDef::hidden("password"))
        .with_hierarchy(Hierarchy::new(
            "type",
            ProfileKind::Staff.type_ranks().iter().copied(),
        ))
        .owned_by(Ownership::SelfReferencing)
}

/// Name of the role every new profile of this type receives.
pub fn default_role_name(kind: ProfileKind, profile_type: &str) -> Option<&'static str> {
    match (kind, profile_type) {
        (ProfileKind::Member, "tourist") => Some("tourist_role"),
        (ProfileKind::Member, "real") => Some("real_member_role"),
        (ProfileKind::Staff, "staff") => Some("staff_role"),
        (ProfileKind::Staff, "admin") => Some("admin_role"),
        _ => None,
    }
}

/// Build the default catalog: member and staff schemas, three scopes,
/// thirteen permissions and four roles. Every record goes through the
/// validated write path.
pub fn default_catalog() -> ScopegateResult<CatalogSnapshot> {
    let catalog = InMemoryCatalog::default();
    catalog.register_schema(member_schema())?;
    catalog.register_schema(staff_schema())?;

    let member_basic = catalog
        .insert_scope(
            named(Scope::new("member_basic", "member"), "Member Basic").including([
                "id",
                "username",
                "email",
                "full_name",
                "type",
                "is_active",
                "created_at",
                "updated_at",
            ]),
        )?
        .value;
    let member_all = catalog
        .insert_scope(
            named(Scope::new("member_all", "member"), "Member All")
                .with_parent(member_basic.id)
                .including(["phone", "national_id"]),
        )?
        .value;
    let staff_basic = catalog
        .insert_scope(
            named(Scope::new("staff_basic", "staff"), "Staff Basic").including([
                "id",
                "username",
                "email",
                "type",
                "is_active",
                "created_at",
                "updated_at",
            ]),
        )?
        .value;

    use Action::*;
    use RowAccess::*;
    let grants = [
        (&member_basic, Get, ProfileHierarchy, "members view same or lower rank members"),
        (&member_all, Get, Own, "members view their full record"),
        (&member_all, Update, Own, "members update their full record"),
        (&member_all, Get, All, "staff view every member"),
        (&member_all, Create, All, "staff create members"),
        (&member_all, Update, All, "staff update every member"),
        (&member_all, Delete, All, "staff delete members"),
        (&staff_basic, Update, Own, "staff update their own record"),
        (&staff_basic, Get, ProfileHierarchy, "staff view same or lower rank staff"),
        (&staff_basic, Get, All, "admins view every staff member"),
        (&staff_basic, Create, All, "admins create staff"),
        (&staff_basic, Update, All, "admins update staff"),
        (&staff_basic, Delete, All, "admins delete staff"),
    ];
    let mut ids = std::collections::BTreeMap::new();
    for (scope, action, row_access, description) in grants {
        let mut permission = Permission::new(scope.id, action, row_access);
        permission.description = description.to_string();
        let permission = catalog.insert_permission(permission)?.value;
        ids.insert(format!("{}:{action}:{row_access}", scope.code), permission.id);
    }
    let pick = |keys: &[&str]| -> ScopegateResult<Vec<Uuid>> {
        keys.iter()
            .map(|k| {
                ids.get(*k)
                    .copied()
                    .ok_or_else(|| ScopegateError::Internal(format!("seed permission {k}")))
            })
            .collect()
    };

    let member_grants = [
        "member_basic:get:profile_hierarchy",
        "member_all:get:own",
        "member_all:update:own",
    ];
    let member_admin_grants = [
        "member_all:get:all",
        "member_all:create:all",
        "member_all:update:all",
        "member_all:delete:all",
    ];

    let roles = [
        Role::new("tourist_role").granting(pick(&member_grants)?),
        Role::new("real_member_role").granting(pick(&member_grants)?),
        Role::new("staff_role")
            .staff_only()
            .granting(pick(&member_admin_grants)?)
            .granting(pick(&[
                "staff_basic:get:profile_hierarchy",
                "staff_basic:update:own",
            ])?),
        Role::new("admin_role")
            .staff_only()
            .granting(pick(&member_admin_grants)?)
            .granting(pick(&[
                "staff_basic:get:all",
                "staff_basic:create:all",
                "staff_basic:update:all",
                "staff_basic:delete:all",
            ])?),
    ];
    for role in roles {
        catalog.insert_role(role)?;
    }

    Ok(CatalogSnapshot::clone(&catalog.snapshot()))
}

/// Give `profile` the default role of its type, when one exists in
/// `catalog`.
pub fn assign_default_role(catalog: &CatalogSnapshot, profile: Profile) -> Profile {
    let role_id = default_role_name(profile.kind, &profile.profile_type)
        .and_then(|name| catalog.roles.values().find(|r| r.name == name))
        .map(|r| r.id);
    match role_id {
        Some(id) => profile.with_roles([id]),
        None => profile,
    }
}

fn named(mut scope: Scope, name: &str) -> Scope {
    scope.name = name.to_string();
    scope
}

#[cfg(test)]
mod tests {
    use scopegate_core::catalog::CatalogReader;

    use super::*;

    #[test]
    fn default_catalog_has_expected_shape() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.scopes.len(), 3);
        assert_eq!(catalog.permissions.len(), 13);
        assert_eq!(catalog.roles.len(), 4);

        let staff = catalog.roles.values().find(|r| r.name == "staff_role").unwrap();
        assert!(staff.staff_only);
        assert_eq!(staff.permission_ids.len(), 6);
        let admin = catalog.roles.values().find(|r| r.name == "admin_role").unwrap();
        assert_eq!(admin.permission_ids.len(), 8);
    }

    #[test]
    fn member_all_extends_member_basic() {
        let catalog = default_catalog().unwrap();
        let basic = catalog.scope_by_code("member_basic").unwrap().unwrap();
        let all = catalog.scope_by_code("member_all").unwrap().unwrap();
        assert_eq!(all.parent_id, Some(basic.id));
    }

    #[test]
    fn default_roles_follow_profile_type() {
        let catalog = default_catalog().unwrap();
        let real = assign_default_role(&catalog, Profile::member("m").with_type("real"));
        let role = catalog.role(*real.role_ids.first().unwrap()).unwrap().unwrap();
        assert_eq!(role.name, "real_member_role");

        let odd = assign_default_role(&catalog, Profile::member("m").with_type("vip"));
        assert!(odd.role_ids.is_empty());
    }
}

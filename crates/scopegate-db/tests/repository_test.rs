//! Catalog repositories against in-memory SurrealDB, and the snapshot they
//! feed to the engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use scopegate_core::error::{ScopegateError, ValidationError};
use scopegate_core::models::access::{AccessLevel, Action, RowAccess};
use scopegate_core::models::bundle::CreateGrantBundle;
use scopegate_core::models::permission::CreatePermission;
use scopegate_core::models::profile::{CreateProfile, ProfileKind, UpdateProfile};
use scopegate_core::models::role::CreateRole;
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::models::scope::{CreateScope, Scope, UpdateScope};
use scopegate_core::repository::{
    GrantBundleRepository, Pagination, PermissionRepository, ProfileRepository, RoleRepository,
    ScopeRepository,
};
use scopegate_db::repository::{
    SurrealGrantBundleRepository, SurrealPermissionRepository, SurrealProfileRepository,
    SurrealRoleRepository, SurrealScopeRepository,
};
use scopegate_engine::seed::member_schema;
use scopegate_engine::{AccessEngine, EngineConfig, InMemoryCache, InMemoryCatalog};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    scopegate_db::run_migrations(&db).await.unwrap();
    db
}

fn schemas() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register(member_schema());
    registry
}

fn scope_input(code: &str, parent_id: Option<uuid::Uuid>, fields: &[&str]) -> CreateScope {
    CreateScope {
        code: code.into(),
        name: code.into(),
        entity_type: "member".into(),
        parent_id,
        included_fields: fields.iter().map(|f| f.to_string()).collect(),
        excluded_fields: BTreeSet::new(),
        category: Default::default(),
        group: String::new(),
    }
}

async fn basic_and_all(repo: &SurrealScopeRepository<Db>) -> (Scope, Scope) {
    let basic = repo
        .create(scope_input("member_basic", None, &["id", "username", "email"]))
        .await
        .unwrap();
    let all = repo
        .create(scope_input("member_all", Some(basic.id), &["phone"]))
        .await
        .unwrap();
    (basic, all)
}

fn grant(scope_id: uuid::Uuid, action: Action, row_access: RowAccess) -> CreatePermission {
    CreatePermission {
        scope_id,
        action,
        row_access,
        description: String::new(),
    }
}

fn role_input(name: &str, staff_only: bool, permission_ids: BTreeSet<uuid::Uuid>) -> CreateRole {
    CreateRole {
        name: name.into(),
        description: String::new(),
        staff_only,
        permission_ids,
        bundle_ids: BTreeSet::new(),
    }
}

fn member_input(username: &str, role_ids: BTreeSet<uuid::Uuid>) -> CreateProfile {
    CreateProfile {
        kind: ProfileKind::Member,
        username: username.into(),
        email: String::new(),
        profile_type: Some("real".into()),
        role_ids,
        permission_ids: BTreeSet::new(),
    }
}

#[tokio::test]
async fn scope_round_trip_and_lookup_by_code() {
    let db = setup().await;
    let repo = SurrealScopeRepository::new(db, schemas());
    let (basic, all) = basic_and_all(&repo).await;

    let fetched = repo.get_by_code("member_all").await.unwrap();
    assert_eq!(fetched.id, all.id);
    assert_eq!(fetched.parent_id, Some(basic.id));
    assert_eq!(fetched.included_fields, BTreeSet::from(["phone".to_string()]));

    let page = repo
        .list(Pagination {
            offset: 0,
            limit: 1,
        })
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].code, "member_all");
}

#[tokio::test]
async fn scope_writes_are_validated() {
    let db = setup().await;
    let repo = SurrealScopeRepository::new(db, schemas());
    let (basic, all) = basic_and_all(&repo).await;

    let duplicate = repo
        .create(scope_input("member_basic", None, &["id"]))
        .await
        .unwrap_err();
    assert!(matches!(
        duplicate,
        ScopegateError::Validation(ValidationError::DuplicateName { .. })
    ));

    let undeclared = repo
        .create(scope_input("member_extra", None, &["salary"]))
        .await
        .unwrap_err();
    assert!(matches!(
        undeclared,
        ScopegateError::Validation(ValidationError::UnknownFields { .. })
    ));

    let cycle = repo
        .update(
            basic.id,
            UpdateScope {
                parent_id: Some(Some(all.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        cycle,
        ScopegateError::Validation(ValidationError::InheritanceCycle { .. })
    ));

    let parent_delete = repo.delete(basic.id).await.unwrap_err();
    assert!(matches!(
        parent_delete,
        ScopegateError::Validation(ValidationError::ScopeHasChildren { .. })
    ));
}

#[tokio::test]
async fn chains_deeper_than_the_maximum_are_rejected() {
    let db = setup().await;
    let repo = SurrealScopeRepository::new(db, schemas()).with_max_inheritance_depth(2);
    let (_, all) = basic_and_all(&repo).await;

    let err = repo
        .create(scope_input("member_deep", Some(all.id), &["email"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScopegateError::Validation(ValidationError::InheritanceTooDeep { depth: 3, max: 2, .. })
    ));
}

#[tokio::test]
async fn duplicate_permission_triples_are_rejected() {
    let db = setup().await;
    let scopes = SurrealScopeRepository::new(db.clone(), schemas());
    let (basic, _) = basic_and_all(&scopes).await;
    let permissions = SurrealPermissionRepository::new(db);

    permissions
        .create(grant(basic.id, Action::Get, RowAccess::Own))
        .await
        .unwrap();
    let err = permissions
        .create(grant(basic.id, Action::Get, RowAccess::Own))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScopegateError::Validation(ValidationError::DuplicatePermission { .. })
    ));

    let missing_scope = permissions
        .create(grant(uuid::Uuid::new_v4(), Action::Get, RowAccess::Own))
        .await
        .unwrap_err();
    assert!(matches!(missing_scope, ScopegateError::NotFound { .. }));
}

#[tokio::test]
async fn staff_only_roles_cannot_go_to_members() {
    let db = setup().await;
    let roles = SurrealRoleRepository::new(db.clone());
    let profiles = SurrealProfileRepository::new(db);

    let admin = roles
        .create(role_input("admin_role", true, BTreeSet::new()))
        .await
        .unwrap();
    let err = profiles
        .create(member_input("m", BTreeSet::from([admin.id])))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScopegateError::Validation(ValidationError::RoleNotAssignable { .. })
    ));
}

#[tokio::test]
async fn deleting_records_cascades_through_edges() {
    let db = setup().await;
    let scopes = SurrealScopeRepository::new(db.clone(), schemas());
    let permissions = SurrealPermissionRepository::new(db.clone());
    let bundles = SurrealGrantBundleRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db.clone());
    let profiles = SurrealProfileRepository::new(db);

    let (_, all) = basic_and_all(&scopes).await;
    let get = permissions
        .create(grant(all.id, Action::Get, RowAccess::Own))
        .await
        .unwrap();
    let export = permissions
        .create(grant(all.id, Action::Export, RowAccess::All))
        .await
        .unwrap();
    let bundle = bundles
        .create(CreateGrantBundle {
            name: "reporting".into(),
            description: String::new(),
            permission_ids: BTreeSet::from([export.id]),
        })
        .await
        .unwrap();
    let mut input = role_input("member_role", false, BTreeSet::from([get.id]));
    input.bundle_ids = BTreeSet::from([bundle.id]);
    let role = roles.create(input).await.unwrap();
    let member = profiles
        .create(member_input("m", BTreeSet::from([role.id])))
        .await
        .unwrap();

    let stored = roles.get_by_id(role.id).await.unwrap();
    assert_eq!(stored.permission_ids, BTreeSet::from([get.id]));
    assert_eq!(stored.bundle_ids, BTreeSet::from([bundle.id]));

    permissions.delete(export.id).await.unwrap();
    assert!(bundles.get_by_id(bundle.id).await.unwrap().permission_ids.is_empty());

    bundles.delete(bundle.id).await.unwrap();
    assert!(roles.get_by_id(role.id).await.unwrap().bundle_ids.is_empty());

    roles.delete(role.id).await.unwrap();
    assert!(profiles.get_by_id(member.id).await.unwrap().role_ids.is_empty());

    scopes.delete(all.id).await.unwrap();
    assert!(permissions.get_by_id(get.id).await.is_err());
}

#[tokio::test]
async fn profiles_list_by_kind() {
    let db = setup().await;
    let profiles = SurrealProfileRepository::new(db);
    profiles
        .create(member_input("m1", BTreeSet::new()))
        .await
        .unwrap();
    profiles
        .create(member_input("m2", BTreeSet::new()))
        .await
        .unwrap();
    profiles
        .create(CreateProfile {
            kind: ProfileKind::Staff,
            username: "s".into(),
            email: String::new(),
            profile_type: None,
            role_ids: BTreeSet::new(),
            permission_ids: BTreeSet::new(),
        })
        .await
        .unwrap();

    let members = profiles
        .list(Some(ProfileKind::Member), Pagination::default())
        .await
        .unwrap();
    assert_eq!(members.total, 2);
    assert!(members.items.iter().all(|p| p.kind == ProfileKind::Member));

    let everyone = profiles.list(None, Pagination::default()).await.unwrap();
    assert_eq!(everyone.total, 3);

    let dup = profiles
        .create(member_input("m1", BTreeSet::new()))
        .await
        .unwrap_err();
    assert!(matches!(
        dup,
        ScopegateError::Validation(ValidationError::DuplicateName { .. })
    ));
}

#[tokio::test]
async fn loaded_snapshot_drives_the_engine() {
    let db = setup().await;
    let scopes = SurrealScopeRepository::new(db.clone(), schemas());
    let permissions = SurrealPermissionRepository::new(db.clone());
    let roles = SurrealRoleRepository::new(db.clone());
    let profiles = SurrealProfileRepository::new(db.clone());

    let (basic, all) = basic_and_all(&scopes).await;
    let hierarchy = permissions
        .create(grant(basic.id, Action::Get, RowAccess::ProfileHierarchy))
        .await
        .unwrap();
    let own = permissions
        .create(grant(all.id, Action::Get, RowAccess::Own))
        .await
        .unwrap();
    let role = roles
        .create(role_input(
            "real_member_role",
            false,
            BTreeSet::from([hierarchy.id, own.id]),
        ))
        .await
        .unwrap();
    let member = profiles
        .create(member_input("m", BTreeSet::from([role.id])))
        .await
        .unwrap();

    let snapshot = scopegate_db::load_snapshot(&db, schemas()).await.unwrap();
    assert_eq!(snapshot.scopes.len(), 2);
    assert_eq!(snapshot.profiles[&member.id].role_ids, BTreeSet::from([role.id]));

    let engine = AccessEngine::new(
        Arc::new(InMemoryCatalog::new(snapshot)),
        Arc::new(InMemoryCache::new()),
        EngineConfig::default(),
    );
    let access = engine
        .get_allowed_fields_with_access(member.id, "member", Action::Get)
        .unwrap();
    assert_eq!(access["username"], AccessLevel::ProfileHierarchy);
    assert_eq!(access["phone"], AccessLevel::Own);
    assert!(!engine.has_model_permission(member.id, "member", Action::Update).unwrap());

    // A membership change written through the repository shows up once the
    // engine is told about it.
    let updated = profiles
        .update(
            member.id,
            UpdateProfile {
                role_ids: Some(BTreeSet::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.role_ids.is_empty());
    let reloaded = scopegate_db::load_snapshot(&db, schemas()).await.unwrap();
    engine.catalog().replace(reloaded);
    engine.on_profile_membership_changed(member.id);
    assert!(!engine.has_model_permission(member.id, "member", Action::Get).unwrap());
}

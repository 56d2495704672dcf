//! The embedded (`mem://`) database opened through `DbManager`.

use std::collections::BTreeSet;

use scopegate_core::models::profile::{CreateProfile, ProfileKind};
use scopegate_core::models::role::CreateRole;
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::{ProfileRepository, RoleRepository};
use scopegate_db::{DbConfig, DbManager};

#[tokio::test]
async fn in_memory_manager_is_migrated_and_serves_repositories() {
    let manager = DbManager::connect(&DbConfig::in_memory()).await.unwrap();

    // A second migration run finds nothing left to apply.
    let applied = scopegate_db::run_migrations(manager.client()).await.unwrap();
    assert_eq!(applied, 0);

    let role = manager
        .roles()
        .create(CreateRole {
            name: "staff_role".into(),
            description: String::new(),
            staff_only: true,
            permission_ids: BTreeSet::new(),
            bundle_ids: BTreeSet::new(),
        })
        .await
        .unwrap();
    manager
        .profiles()
        .create(CreateProfile {
            kind: ProfileKind::Staff,
            username: "desk".into(),
            email: "desk@example.com".into(),
            profile_type: None,
            role_ids: BTreeSet::from([role.id]),
            permission_ids: BTreeSet::new(),
        })
        .await
        .unwrap();

    let snapshot = manager.snapshot(SchemaRegistry::new()).await.unwrap();
    assert_eq!(snapshot.roles.len(), 1);
    let profile = snapshot.profiles.values().next().unwrap();
    assert_eq!(profile.profile_type, "staff");
    assert_eq!(profile.role_ids, BTreeSet::from([role.id]));
}

//! End-to-end access scenarios over the in-memory catalog and cache.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use scopegate_core::models::access::{AccessLevel, Action, FieldAccessMap, RowAccess};
use scopegate_core::models::permission::Permission;
use scopegate_core::models::profile::Profile;
use scopegate_core::models::role::Role;
use scopegate_core::models::scope::Scope;
use scopegate_engine::seed::member_schema;
use scopegate_engine::{AccessEngine, EngineConfig, InMemoryCache, InMemoryCatalog, RowPredicate};
use serde_json::json;
use uuid::Uuid;

type Engine = AccessEngine<Arc<InMemoryCatalog>, Arc<InMemoryCache>>;

struct Fixture {
    catalog: Arc<InMemoryCatalog>,
    cache: Arc<InMemoryCache>,
    engine: Engine,
    hierarchy_grant: Uuid,
    own_grant: Uuid,
    role: Uuid,
    m1: Profile,
    m2: Profile,
}

/// `member_basic` {id, username, email} extended by `member_all`
/// {phone, national_id}; role R grants get:profile_hierarchy on the
/// first and get:own on the second; M1 and M2 hold R.
fn fixture() -> Fixture {
    let catalog = Arc::new(InMemoryCatalog::default());
    let cache = Arc::new(InMemoryCache::new());
    let engine = AccessEngine::new(catalog.clone(), cache.clone(), EngineConfig::default());

    let mut events = Vec::new();
    events.extend(catalog.register_schema(member_schema()).unwrap().events);

    let basic = catalog
        .insert_scope(Scope::new("member_basic", "member").including(["id", "username", "email"]))
        .unwrap();
    events.extend(basic.events);
    let basic = basic.value;
    let all = catalog
        .insert_scope(
            Scope::new("member_all", "member")
                .with_parent(basic.id)
                .including(["phone", "national_id"]),
        )
        .unwrap();
    events.extend(all.events);
    let all = all.value;

    let hierarchy_grant = catalog
        .insert_permission(Permission::new(basic.id, Action::Get, RowAccess::ProfileHierarchy))
        .unwrap()
        .value
        .id;
    let own_grant = catalog
        .insert_permission(Permission::new(all.id, Action::Get, RowAccess::Own))
        .unwrap()
        .value
        .id;
    let role = catalog
        .insert_role(Role::new("R").granting([hierarchy_grant, own_grant]))
        .unwrap()
        .value
        .id;

    let m1 = catalog
        .insert_profile(Profile::member("m1").with_type("real").with_roles([role]))
        .unwrap();
    events.extend(m1.events);
    let m2 = catalog
        .insert_profile(Profile::member("m2").with_type("real").with_roles([role]))
        .unwrap();
    events.extend(m2.events);
    engine.apply_all(&events);

    Fixture {
        catalog,
        cache,
        engine,
        hierarchy_grant,
        own_grant,
        role,
        m1: m1.value,
        m2: m2.value,
    }
}

fn access(pairs: &[(&str, AccessLevel)]) -> FieldAccessMap {
    pairs.iter().map(|(f, l)| (f.to_string(), *l)).collect()
}

fn record(profile: &Profile) -> serde_json::Value {
    json!({
        "id": profile.id.to_string(),
        "username": profile.username,
        "email": format!("{}@example.test", profile.username),
        "type": profile.profile_type,
        "phone": "555-0100",
        "national_id": "X-1",
    })
}

#[test]
fn inherited_fields_take_the_strongest_grant() {
    let f = fixture();
    let got = f
        .engine
        .get_allowed_fields_with_access(f.m1.id, "member", Action::Get)
        .unwrap();
    assert_eq!(
        got,
        access(&[
            ("id", AccessLevel::ProfileHierarchy),
            ("username", AccessLevel::ProfileHierarchy),
            ("email", AccessLevel::ProfileHierarchy),
            ("phone", AccessLevel::Own),
            ("national_id", AccessLevel::Own),
        ])
    );
}

#[test]
fn other_actions_are_denied() {
    let f = fixture();
    assert!(f.engine.has_model_permission(f.m1.id, "member", Action::Get).unwrap());
    assert!(!f.engine.has_model_permission(f.m1.id, "member", Action::Delete).unwrap());
    assert!(
        f.engine
            .get_allowed_fields(f.m1.id, "member", Action::Update)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn field_level_checks() {
    let f = fixture();
    let e = &f.engine;
    assert_eq!(
        e.get_field_access_level(f.m1.id, "member", Action::Get, "phone").unwrap(),
        AccessLevel::Own
    );
    assert!(
        e.has_field_permission(f.m1.id, "member", Action::Get, "email", AccessLevel::Own)
            .unwrap()
    );
    assert!(
        !e.has_field_permission(f.m1.id, "member", Action::Get, "phone", AccessLevel::All)
            .unwrap()
    );
    assert_eq!(
        e.get_field_access_level(f.m1.id, "member", Action::Get, "password").unwrap(),
        AccessLevel::None
    );
}

#[test]
fn redaction_keeps_own_record_and_hides_others_private_fields() {
    let f = fixture();
    let mut payload = json!([record(&f.m1), record(&f.m2)]);
    f.engine
        .redact(f.m1.id, "member", Action::Get, &mut payload)
        .unwrap();

    assert_eq!(payload[0], record(&f.m1));

    let other = &payload[1];
    assert_eq!(other["id"], json!(f.m2.id.to_string()));
    assert_eq!(other["username"], json!("m2"));
    assert_eq!(other["email"], json!("m2@example.test"));
    assert_eq!(other["phone"], serde_json::Value::Null);
    assert_eq!(other["national_id"], serde_json::Value::Null);
}

#[test]
fn deleting_the_only_grant_on_a_scope_takes_effect_immediately() {
    let f = fixture();
    let before = f
        .engine
        .get_allowed_fields(f.m1.id, "member", Action::Get)
        .unwrap();
    assert!(before.contains("phone"));

    f.catalog.delete_permission(f.own_grant).unwrap();
    f.engine.on_permission_changed(f.own_grant);

    for profile in [&f.m1, &f.m2] {
        let after = f
            .engine
            .get_allowed_fields(profile.id, "member", Action::Get)
            .unwrap();
        assert_eq!(
            after,
            BTreeSet::from(["email".to_string(), "id".to_string(), "username".to_string()])
        );
    }
}

#[test]
fn hierarchy_grant_resolves_to_a_type_filter() {
    let f = fixture();
    let predicate = f
        .engine
        .row_visibility_predicate(f.m1.id, "member", Action::Get)
        .unwrap();
    match &predicate {
        RowPredicate::TypeIn { field, types } => {
            assert_eq!(field, "type");
            assert_eq!(types, &BTreeSet::from(["real".to_string(), "tourist".to_string()]));
        }
        other => panic!("unexpected predicate {other:?}"),
    }
    let records = [record(&f.m1), record(&f.m2)];
    assert_eq!(predicate.filter(&records).len(), 2);

    let nobody = f
        .engine
        .row_visibility_predicate(Uuid::new_v4(), "member", Action::Get)
        .unwrap();
    assert_eq!(nobody, RowPredicate::DenyAll);
}

#[test]
fn cache_hits_match_misses() {
    let f = fixture();
    let cold = f
        .engine
        .get_allowed_fields_with_access(f.m2.id, "member", Action::Get)
        .unwrap();
    let warm = f
        .engine
        .get_allowed_fields_with_access(f.m2.id, "member", Action::Get)
        .unwrap();
    assert_eq!(cold, warm);

    let key = f.engine.cache().store().keys().access(f.m2.id, "member");
    assert!(f.cache.contains_key(&key));
    f.engine.cache().clear();
    let rebuilt = f
        .engine
        .get_allowed_fields_with_access(f.m2.id, "member", Action::Get)
        .unwrap();
    assert_eq!(cold, rebuilt);
}

#[test]
fn role_change_propagates_to_every_holder() {
    let f = fixture();
    for profile in [&f.m1, &f.m2] {
        f.engine
            .get_allowed_fields(profile.id, "member", Action::Get)
            .unwrap();
    }

    let change = f
        .catalog
        .update_role(
            f.role,
            scopegate_core::models::role::UpdateRole {
                permission_ids: Some(BTreeSet::from([f.hierarchy_grant])),
                ..Default::default()
            },
        )
        .unwrap();
    f.engine.apply_all(&change.events);

    for profile in [&f.m1, &f.m2] {
        let fields = f
            .engine
            .get_allowed_fields(profile.id, "member", Action::Get)
            .unwrap();
        assert!(!fields.contains("phone"));
        assert!(fields.contains("username"));
    }
}

//! Expansion of roles into the permissions they grant.

use std::collections::BTreeSet;

use scopegate_core::cache::{CacheBackend, CacheValue};
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::ScopegateResult;
use scopegate_core::models::profile::ProfileKind;
use scopegate_core::models::role::Role;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::CacheStore;

pub struct RoleAggregator<'a, S: ?Sized, C> {
    catalog: &'a S,
    store: &'a CacheStore<C>,
}

impl<'a, S, C> RoleAggregator<'a, S, C>
where
    S: CatalogReader + ?Sized,
    C: CacheBackend,
{
    pub fn new(catalog: &'a S, store: &'a CacheStore<C>) -> Self {
        Self { catalog, store }
    }

    /// Direct permissions of `role` plus those of every attached bundle,
    /// with bundles read straight from the catalog.
    pub fn permission_ids(&self, role: &Role) -> ScopegateResult<BTreeSet<Uuid>> {
        self.permission_ids_with(role, |bundle_id| {
            Ok(self.catalog.bundle(bundle_id)?.map(|b| b.permission_ids))
        })
    }

    /// Like [`permission_ids`](Self::permission_ids), resolving each bundle
    /// through `bundle_permissions`. A bundle it cannot find contributes
    /// nothing.
    pub fn permission_ids_with<F>(
        &self,
        role: &Role,
        mut bundle_permissions: F,
    ) -> ScopegateResult<BTreeSet<Uuid>>
    where
        F: FnMut(Uuid) -> ScopegateResult<Option<BTreeSet<Uuid>>>,
    {
        let mut ids = role.permission_ids.clone();
        for &bundle_id in &role.bundle_ids {
            match bundle_permissions(bundle_id)? {
                Some(bundle_ids) => ids.extend(bundle_ids),
                None => warn!(role = %role.name, %bundle_id, "role refers to missing grant bundle"),
            }
        }
        Ok(ids)
    }

    /// Roles a member may hold: every role not flagged staff-only.
    pub fn member_role_ids(&self) -> ScopegateResult<BTreeSet<Uuid>> {
        self.partition(ProfileKind::Member)
    }

    /// Staff-only roles.
    pub fn staff_role_ids(&self) -> ScopegateResult<BTreeSet<Uuid>> {
        self.partition(ProfileKind::Staff)
    }

    fn partition(&self, kind: ProfileKind) -> ScopegateResult<BTreeSet<Uuid>> {
        let key = self.store.keys().role_partition(kind);
        if let Some(ids) = self.store.ids(&key) {
            return Ok(ids);
        }

        let staff_only = kind == ProfileKind::Staff;
        let ids: BTreeSet<Uuid> = self
            .catalog
            .roles()?
            .into_iter()
            .filter(|r| r.staff_only == staff_only)
            .map(|r| r.id)
            .collect();
        info!(%kind, count = ids.len(), "cached role partition");
        self.store.set(&key, CacheValue::Ids(ids.clone()));
        Ok(ids)
    }

    /// Drop both cached partitions.
    pub fn invalidate_partitions(&self) {
        let keys = self.store.keys();
        self.store.delete(&keys.role_partition(ProfileKind::Member));
        self.store.delete(&keys.role_partition(ProfileKind::Staff));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scopegate_core::cache::CacheKeys;
    use scopegate_core::models::bundle::GrantBundle;

    use super::*;
    use crate::memory::InMemoryCache;
    use crate::snapshot::CatalogSnapshot;

    fn store() -> CacheStore<Arc<InMemoryCache>> {
        CacheStore::new(Arc::new(InMemoryCache::new()), CacheKeys::default(), None)
    }

    #[test]
    fn unions_direct_and_bundled_permissions() {
        let direct = Uuid::new_v4();
        let bundled = Uuid::new_v4();
        let bundle = GrantBundle::new("readers").granting([bundled, direct]);
        let role = Role::new("r")
            .granting([direct])
            .with_bundles([bundle.id, Uuid::new_v4()]);

        let mut c = CatalogSnapshot::default();
        c.bundles.insert(bundle.id, bundle);
        let store = store();

        let ids = RoleAggregator::new(&c, &store).permission_ids(&role).unwrap();
        assert_eq!(ids, BTreeSet::from([direct, bundled]));
    }

    #[test]
    fn partitions_are_cached_until_invalidated() {
        let member_role = Role::new("tourist_role");
        let staff_role = Role::new("admin_role").staff_only();
        let mut c = CatalogSnapshot::default();
        c.roles.insert(member_role.id, member_role.clone());
        c.roles.insert(staff_role.id, staff_role.clone());
        let store = store();

        let aggregator = RoleAggregator::new(&c, &store);
        assert_eq!(aggregator.member_role_ids().unwrap(), BTreeSet::from([member_role.id]));
        assert_eq!(aggregator.staff_role_ids().unwrap(), BTreeSet::from([staff_role.id]));

        let late = Role::new("late");
        c.roles.insert(late.id, late.clone());
        let aggregator = RoleAggregator::new(&c, &store);
        assert_eq!(aggregator.member_role_ids().unwrap().len(), 1);

        aggregator.invalidate_partitions();
        assert_eq!(aggregator.member_role_ids().unwrap().len(), 2);
    }
}

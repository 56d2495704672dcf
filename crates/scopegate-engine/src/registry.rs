//! Scope inheritance: effective fields, legality checks and tracing.
//!
//! Every traversal is bounded by [`MAX_TRAVERSAL`] and tracks visited ids,
//! so a corrupted catalog with a parent cycle degrades to a truncated chain
//! instead of looping.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{FieldList, ScopegateResult, ValidationError};
use scopegate_core::models::scope::Scope;
use tracing::warn;
use uuid::Uuid;

/// Hard upper bound on any walk over the scope tree.
pub const MAX_TRAVERSAL: usize = 64;

/// Default longest chain, the scope itself included.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Where a field of a scope's effective set comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Removed by this scope's exclusions.
    ExcludedBy { scope_id: Uuid, code: String },
    /// Contributed by this scope's inclusions.
    IncludedBy { scope_id: Uuid, code: String },
    Absent,
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSource::ExcludedBy { code, .. } => write!(f, "excluded by {code}"),
            FieldSource::IncludedBy { code, .. } => write!(f, "included by {code}"),
            FieldSource::Absent => f.write_str("absent"),
        }
    }
}

pub struct ScopeRegistry<'a, S: ?Sized> {
    catalog: &'a S,
    max_depth: usize,
}

impl<'a, S: CatalogReader + ?Sized> ScopeRegistry<'a, S> {
    pub fn new(catalog: &'a S) -> Self {
        Self {
            catalog,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Ancestors of `scope`, nearest first. Stops at a missing parent or at
    /// an id already seen.
    pub fn ancestors(&self, scope: &Scope) -> ScopegateResult<Vec<Scope>> {
        let mut seen = HashSet::from([scope.id]);
        let mut ancestors = Vec::new();
        let mut next = scope.parent_id;

        while let Some(parent_id) = next {
            if !seen.insert(parent_id) || seen.len() > MAX_TRAVERSAL {
                warn!(scope = %scope.code, %parent_id, "scope ancestry loops, truncating");
                break;
            }
            let Some(parent) = self.catalog.scope(parent_id)? else {
                warn!(scope = %scope.code, %parent_id, "scope parent is missing");
                break;
            };
            next = parent.parent_id;
            ancestors.push(parent);
        }
        Ok(ancestors)
    }

    /// `scope` and its ancestors, from the root down to `scope`.
    pub fn inheritance_chain(&self, scope: &Scope) -> ScopegateResult<Vec<Scope>> {
        let mut chain = self.ancestors(scope)?;
        chain.reverse();
        chain.push(scope.clone());
        Ok(chain)
    }

    /// Chain length, `scope` included.
    pub fn inheritance_depth(&self, scope: &Scope) -> ScopegateResult<usize> {
        Ok(self.ancestors(scope)?.len() + 1)
    }

    /// Effective fields: each level adds its inclusions to its parent's set,
    /// then removes its own exclusions.
    pub fn get_effective_fields(&self, scope: &Scope) -> ScopegateResult<BTreeSet<String>> {
        let mut fields = BTreeSet::new();
        for level in self.inheritance_chain(scope)? {
            fields.extend(level.included_fields.iter().cloned());
            fields.retain(|f| !level.excluded_fields.contains(f));
        }
        Ok(fields)
    }

    /// Report which scope decides whether `field` is present. Exclusions are
    /// checked from `scope` upwards and win; otherwise the topmost scope
    /// including the field is reported.
    pub fn trace_field_source(&self, scope: &Scope, field: &str) -> ScopegateResult<FieldSource> {
        let chain = self.inheritance_chain(scope)?;

        if let Some(s) = chain.iter().rev().find(|s| s.excluded_fields.contains(field)) {
            return Ok(FieldSource::ExcludedBy {
                scope_id: s.id,
                code: s.code.clone(),
            });
        }
        if let Some(s) = chain.iter().find(|s| s.included_fields.contains(field)) {
            return Ok(FieldSource::IncludedBy {
                scope_id: s.id,
                code: s.code.clone(),
            });
        }
        Ok(FieldSource::Absent)
    }

    /// Every active descendant of `scope`. Inactive scopes end their branch.
    pub fn get_descendants(&self, scope: &Scope) -> ScopegateResult<Vec<Scope>> {
        self.collect_descendants(scope.id, true)
    }

    /// Every descendant of `scope`, active or not. Invalidation needs the
    /// whole subtree since effective fields ignore the active flag.
    pub fn subtree(&self, scope_id: Uuid) -> ScopegateResult<Vec<Scope>> {
        self.collect_descendants(scope_id, false)
    }

    fn collect_descendants(&self, root: Uuid, active_only: bool) -> ScopegateResult<Vec<Scope>> {
        let mut seen = HashSet::from([root]);
        let mut pending = vec![root];
        let mut found = Vec::new();

        while let Some(id) = pending.pop() {
            for child in self.catalog.child_scopes(id)? {
                if active_only && !child.is_active {
                    continue;
                }
                if !seen.insert(child.id) || seen.len() > MAX_TRAVERSAL {
                    warn!(scope = %child.code, "scope subtree loops, truncating");
                    continue;
                }
                pending.push(child.id);
                found.push(child);
            }
        }
        Ok(found)
    }

    /// Height of the subtree below `scope_id`: 0 for a leaf.
    fn subtree_height(&self, scope_id: Uuid) -> ScopegateResult<usize> {
        let mut seen = HashSet::from([scope_id]);
        let mut level = vec![scope_id];
        let mut height = 0;

        while !level.is_empty() && seen.len() <= MAX_TRAVERSAL {
            let mut next = Vec::new();
            for id in level {
                for child in self.catalog.child_scopes(id)? {
                    if seen.insert(child.id) {
                        next.push(child.id);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            height += 1;
            level = next;
        }
        Ok(height)
    }

    /// Check that `scope`, as it is about to be stored, is legal: no cycle,
    /// same entity type as its parent, chain not deeper than the maximum
    /// (its existing children included), and only declared fields.
    pub fn validate(&self, scope: &Scope) -> ScopegateResult<()> {
        if let Some(parent_id) = scope.parent_id {
            if parent_id == scope.id {
                return Err(cycle(scope));
            }
            let parent = self.catalog.scope(parent_id)?.ok_or_else(|| {
                ValidationError::MissingParent {
                    scope: scope.code.clone(),
                    parent_id,
                }
            })?;

            // The stored chain above the parent still holds the old version
            // of `scope`, so meeting its id there means a cycle.
            let above = self.ancestors(&parent)?;
            if above.iter().any(|s| s.id == scope.id) {
                return Err(cycle(scope));
            }

            if parent.entity_type != scope.entity_type {
                return Err(ValidationError::ParentEntityTypeMismatch {
                    scope: scope.code.clone(),
                    parent: parent.code.clone(),
                    entity_type: scope.entity_type.clone(),
                    parent_entity_type: parent.entity_type.clone(),
                }
                .into());
            }

            let depth = above.len() + 2 + self.subtree_height(scope.id)?;
            if depth > self.max_depth {
                return Err(ValidationError::InheritanceTooDeep {
                    scope: scope.code.clone(),
                    depth,
                    max: self.max_depth,
                }
                .into());
            }
        }

        self.validate_fields(scope)
    }

    fn validate_fields(&self, scope: &Scope) -> ScopegateResult<()> {
        let schema = self.catalog.entity_schema(&scope.entity_type)?.ok_or_else(|| {
            ValidationError::UnknownEntityType {
                entity_type: scope.entity_type.clone(),
            }
        })?;

        for (list, fields) in [
            (FieldList::Included, &scope.included_fields),
            (FieldList::Excluded, &scope.excluded_fields),
        ] {
            let unknown: Vec<String> = fields
                .iter()
                .filter(|f| !schema.declares(f))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ValidationError::UnknownFields {
                    scope: scope.code.clone(),
                    entity_type: scope.entity_type.clone(),
                    list,
                    fields: unknown,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn cycle(scope: &Scope) -> scopegate_core::ScopegateError {
    ValidationError::InheritanceCycle {
        scope: scope.code.clone(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use scopegate_core::ScopegateError;
    use scopegate_core::models::schema::EntitySchema;

    use super::*;
    use crate::snapshot::CatalogSnapshot;

    fn catalog() -> CatalogSnapshot {
        let mut catalog = CatalogSnapshot::default();
        catalog.register_schema(
            EntitySchema::new("member").fields(["id", "username", "email", "phone", "national_id"]),
        );
        catalog.register_schema(EntitySchema::new("staff").fields(["id", "username"]));
        catalog
    }

    fn insert(catalog: &mut CatalogSnapshot, scope: Scope) -> Scope {
        catalog.scopes.insert(scope.id, scope.clone());
        scope
    }

    fn validation(err: ScopegateError) -> ValidationError {
        match err {
            ScopegateError::Validation(v) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn child_exclusion_removes_parent_inclusion() {
        let mut c = catalog();
        let root = insert(&mut c, Scope::new("root", "member").including(["id", "email"]));
        let child = insert(
            &mut c,
            Scope::new("child", "member")
                .with_parent(root.id)
                .including(["phone"])
                .excluding(["email"]),
        );
        let grandchild = insert(
            &mut c,
            Scope::new("grandchild", "member")
                .with_parent(child.id)
                .including(["email"]),
        );

        let registry = ScopeRegistry::new(&c);
        let fields = registry.get_effective_fields(&child).unwrap();
        assert_eq!(fields, BTreeSet::from(["id".into(), "phone".into()]));

        // A deeper inclusion re-adds what an ancestor excluded.
        let fields = registry.get_effective_fields(&grandchild).unwrap();
        assert!(fields.contains("email"));
    }

    #[test]
    fn trace_reports_exclusion_before_inclusion() {
        let mut c = catalog();
        let root = insert(&mut c, Scope::new("root", "member").including(["id", "email"]));
        let child = insert(
            &mut c,
            Scope::new("child", "member")
                .with_parent(root.id)
                .including(["id"])
                .excluding(["email"]),
        );
        let registry = ScopeRegistry::new(&c);

        assert_eq!(
            registry.trace_field_source(&child, "email").unwrap(),
            FieldSource::ExcludedBy {
                scope_id: child.id,
                code: "child".into()
            }
        );
        // Root-first: the topmost inclusion is reported.
        assert_eq!(
            registry.trace_field_source(&child, "id").unwrap().to_string(),
            "included by root"
        );
        assert_eq!(
            registry.trace_field_source(&child, "phone").unwrap(),
            FieldSource::Absent
        );
    }

    #[test]
    fn rejects_parent_of_other_entity_type() {
        let mut c = catalog();
        let staff = insert(&mut c, Scope::new("staff_basic", "staff"));
        let scope = Scope::new("member_x", "member").with_parent(staff.id);

        let err = validation(ScopeRegistry::new(&c).validate(&scope).unwrap_err());
        assert!(matches!(err, ValidationError::ParentEntityTypeMismatch { .. }));
    }

    #[test]
    fn rejects_cycles() {
        let mut c = catalog();
        let a = insert(&mut c, Scope::new("a", "member"));
        let b = insert(&mut c, Scope::new("b", "member").with_parent(a.id));

        let mut a_updated = a.clone();
        a_updated.parent_id = Some(b.id);
        let err = validation(ScopeRegistry::new(&c).validate(&a_updated).unwrap_err());
        assert_eq!(err, ValidationError::InheritanceCycle { scope: "a".into() });

        let mut self_parent = a.clone();
        self_parent.parent_id = Some(a.id);
        assert!(ScopeRegistry::new(&c).validate(&self_parent).is_err());
    }

    #[test]
    fn rejects_fourth_level() {
        let mut c = catalog();
        let a = insert(&mut c, Scope::new("a", "member"));
        let b = insert(&mut c, Scope::new("b", "member").with_parent(a.id));
        let level3 = insert(&mut c, Scope::new("c", "member").with_parent(b.id));
        let registry = ScopeRegistry::new(&c);

        assert!(registry.validate(&level3).is_ok());
        let level4 = Scope::new("d", "member").with_parent(level3.id);
        let err = validation(registry.validate(&level4).unwrap_err());
        assert_eq!(
            err,
            ValidationError::InheritanceTooDeep {
                scope: "d".into(),
                depth: 4,
                max: 3
            }
        );
    }

    #[test]
    fn reparenting_counts_existing_children() {
        let mut c = catalog();
        let a = insert(&mut c, Scope::new("a", "member"));
        let b = insert(&mut c, Scope::new("b", "member").with_parent(a.id));
        let x = insert(&mut c, Scope::new("x", "member"));
        insert(&mut c, Scope::new("y", "member").with_parent(x.id));

        let mut moved = x.clone();
        moved.parent_id = Some(b.id);
        let err = validation(ScopeRegistry::new(&c).validate(&moved).unwrap_err());
        assert!(matches!(err, ValidationError::InheritanceTooDeep { depth: 4, .. }));
    }

    #[test]
    fn rejects_undeclared_fields() {
        let c = catalog();
        let scope = Scope::new("s", "member").excluding(["salary"]);

        let err = validation(ScopeRegistry::new(&c).validate(&scope).unwrap_err());
        assert_eq!(
            err,
            ValidationError::UnknownFields {
                scope: "s".into(),
                entity_type: "member".into(),
                list: FieldList::Excluded,
                fields: vec!["salary".into()],
            }
        );

        let scope = Scope::new("t", "vehicle");
        let err = validation(ScopeRegistry::new(&c).validate(&scope).unwrap_err());
        assert!(matches!(err, ValidationError::UnknownEntityType { .. }));
    }

    #[test]
    fn descendants_skip_inactive_branches() {
        let mut c = catalog();
        let root = insert(&mut c, Scope::new("root", "member"));
        let mut inactive = Scope::new("inactive", "member").with_parent(root.id);
        inactive.is_active = false;
        let inactive = insert(&mut c, inactive);
        insert(&mut c, Scope::new("below", "member").with_parent(inactive.id));
        let active = insert(&mut c, Scope::new("active", "member").with_parent(root.id));

        let registry = ScopeRegistry::new(&c);
        let descendants = registry.get_descendants(&root).unwrap();
        assert_eq!(descendants.len(), 1);
        assert_eq!(descendants[0].id, active.id);
        assert_eq!(registry.subtree(root.id).unwrap().len(), 3);
    }

    #[test]
    fn corrupted_cycle_is_truncated() {
        let mut c = catalog();
        let mut a = Scope::new("a", "member");
        let mut b = Scope::new("b", "member");
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let a = insert(&mut c, a);
        insert(&mut c, b);

        let registry = ScopeRegistry::new(&c);
        assert_eq!(registry.ancestors(&a).unwrap().len(), 1);
        assert_eq!(registry.inheritance_depth(&a).unwrap(), 2);
    }

    const MEMBER_FIELDS: [&str; 5] = ["id", "username", "email", "phone", "national_id"];

    fn field_set() -> impl Strategy<Value = BTreeSet<String>> {
        proptest::collection::btree_set(
            proptest::sample::select(MEMBER_FIELDS.to_vec()).prop_map(String::from),
            0..=MEMBER_FIELDS.len(),
        )
    }

    proptest! {
        #[test]
        fn effective_fields_never_contain_own_exclusions(
            root_in in field_set(),
            root_out in field_set(),
            mid_in in field_set(),
            mid_out in field_set(),
            leaf_in in field_set(),
            leaf_out in field_set(),
        ) {
            let mut c = catalog();
            let root = insert(
                &mut c,
                Scope::new("root", "member").including(root_in.clone()).excluding(root_out),
            );
            let mid = insert(
                &mut c,
                Scope::new("mid", "member")
                    .with_parent(root.id)
                    .including(mid_in.clone())
                    .excluding(mid_out),
            );
            let leaf = insert(
                &mut c,
                Scope::new("leaf", "member")
                    .with_parent(mid.id)
                    .including(leaf_in.clone())
                    .excluding(leaf_out.clone()),
            );

            let fields = ScopeRegistry::new(&c).get_effective_fields(&leaf).unwrap();
            prop_assert!(fields.is_disjoint(&leaf_out));

            let included: BTreeSet<String> = root_in
                .into_iter()
                .chain(mid_in)
                .chain(leaf_in.iter().cloned())
                .collect();
            prop_assert!(fields.is_subset(&included));
            prop_assert!(leaf_in.difference(&leaf_out).all(|f| fields.contains(f)));
        }
    }
}

//! Role domain model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Staff-only roles are never held by member profiles.
    #[serde(default)]
    pub staff_only: bool,
    /// Permissions granted directly by the role.
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
    /// Grant bundles attached to the role.
    #[serde(default)]
    pub bundle_ids: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            staff_only: false,
            permission_ids: BTreeSet::new(),
            bundle_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn staff_only(mut self) -> Self {
        self.staff_only = true;
        self
    }

    pub fn granting(mut self, permission_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.permission_ids.extend(permission_ids);
        self
    }

    pub fn with_bundles(mut self, bundle_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.bundle_ids.extend(bundle_ids);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub staff_only: bool,
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub bundle_ids: BTreeSet<Uuid>,
}

impl From<CreateRole> for Role {
    fn from(input: CreateRole) -> Self {
        let mut role = Role::new(input.name)
            .granting(input.permission_ids)
            .with_bundles(input.bundle_ids);
        role.description = input.description;
        role.staff_only = input.staff_only;
        role
    }
}

/// Partial update. Whether a role is staff-only is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<BTreeSet<Uuid>>,
    pub bundle_ids: Option<BTreeSet<Uuid>>,
}

impl UpdateRole {
    /// True when the update changes what the role grants.
    pub fn changes_grants(&self) -> bool {
        self.permission_ids.is_some() || self.bundle_ids.is_some()
    }

    pub fn apply_to(self, role: &mut Role) {
        if let Some(name) = self.name {
            role.name = name;
        }
        if let Some(description) = self.description {
            role.description = description;
        }
        if let Some(permission_ids) = self.permission_ids {
            role.permission_ids = permission_ids;
        }
        if let Some(bundle_ids) = self.bundle_ids {
            role.bundle_ids = bundle_ids;
        }
        role.updated_at = Utc::now();
    }
}

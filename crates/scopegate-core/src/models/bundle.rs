//! Grant bundle domain model: a named, reusable set of permissions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantBundle {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GrantBundle {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            permission_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn granting(mut self, permission_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.permission_ids.extend(permission_ids);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGrantBundle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
}

impl From<CreateGrantBundle> for GrantBundle {
    fn from(input: CreateGrantBundle) -> Self {
        let mut bundle = GrantBundle::new(input.name).granting(input.permission_ids);
        bundle.description = input.description;
        bundle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateGrantBundle {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<BTreeSet<Uuid>>,
}

impl UpdateGrantBundle {
    pub fn apply_to(self, bundle: &mut GrantBundle) {
        if let Some(name) = self.name {
            bundle.name = name;
        }
        if let Some(description) = self.description {
            bundle.description = description;
        }
        if let Some(permission_ids) = self.permission_ids {
            bundle.permission_ids = permission_ids;
        }
        bundle.updated_at = Utc::now();
    }
}

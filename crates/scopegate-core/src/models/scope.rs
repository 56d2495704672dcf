//! Scope domain model.
//!
//! A scope names a set of fields of one entity type. Scopes form a tree:
//! a child inherits its parent's effective fields, adds its own inclusions
//! and removes its own exclusions.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeCategory {
    #[default]
    Base,
    Extension,
}

impl ScopeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeCategory::Base => "base",
            ScopeCategory::Extension => "extension",
        }
    }
}

impl FromStr for ScopeCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(ScopeCategory::Base),
            "extension" => Ok(ScopeCategory::Extension),
            other => Err(ValidationError::UnknownValue {
                kind: "scope category",
                value: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: Uuid,
    /// Unique machine name, e.g. `member_basic`.
    pub code: String,
    pub name: String,
    /// Entity type whose fields this scope names.
    pub entity_type: String,
    /// Parent scope. Must carry the same `entity_type`.
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub included_fields: BTreeSet<String>,
    #[serde(default)]
    pub excluded_fields: BTreeSet<String>,
    #[serde(default)]
    pub category: ScopeCategory,
    /// Free-form grouping tag.
    #[serde(default)]
    pub group: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scope {
    /// Build a new active scope with a fresh id and empty field lists.
    pub fn new(code: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let code = code.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: code.clone(),
            code,
            entity_type: entity_type.into(),
            parent_id: None,
            included_fields: BTreeSet::new(),
            excluded_fields: BTreeSet::new(),
            category: ScopeCategory::Base,
            group: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self.category = ScopeCategory::Extension;
        self
    }

    pub fn including<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn excluding<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields.extend(fields.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScope {
    pub code: String,
    pub name: String,
    pub entity_type: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub included_fields: BTreeSet<String>,
    #[serde(default)]
    pub excluded_fields: BTreeSet<String>,
    #[serde(default)]
    pub category: ScopeCategory,
    #[serde(default)]
    pub group: String,
}

/// Partial update. The entity type of a scope is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateScope {
    pub name: Option<String>,
    /// `Some(None)` detaches the scope from its parent.
    pub parent_id: Option<Option<Uuid>>,
    pub included_fields: Option<BTreeSet<String>>,
    pub excluded_fields: Option<BTreeSet<String>>,
    pub category: Option<ScopeCategory>,
    pub group: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateScope {
    /// Apply the update to `scope`, bumping `updated_at`.
    pub fn apply_to(self, scope: &mut Scope) {
        if let Some(name) = self.name {
            scope.name = name;
        }
        if let Some(parent_id) = self.parent_id {
            scope.parent_id = parent_id;
        }
        if let Some(fields) = self.included_fields {
            scope.included_fields = fields;
        }
        if let Some(fields) = self.excluded_fields {
            scope.excluded_fields = fields;
        }
        if let Some(category) = self.category {
            scope.category = category;
        }
        if let Some(group) = self.group {
            scope.group = group;
        }
        if let Some(is_active) = self.is_active {
            scope.is_active = is_active;
        }
        scope.updated_at = Utc::now();
    }
}

impl From<CreateScope> for Scope {
    fn from(input: CreateScope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code: input.code,
            name: input.name,
            entity_type: input.entity_type,
            parent_id: input.parent_id,
            included_fields: input.included_fields,
            excluded_fields: input.excluded_fields,
            category: input.category,
            group: input.group,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

//! Permission domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::{Action, RowAccess};

/// A (scope, action, row access) grant. The triple is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub scope_id: Uuid,
    pub action: Action,
    pub row_access: RowAccess,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(scope_id: Uuid, action: Action, row_access: RowAccess) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scope_id,
            action,
            row_access,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub scope_id: Uuid,
    pub action: Action,
    pub row_access: RowAccess,
    #[serde(default)]
    pub description: String,
}

impl From<CreatePermission> for Permission {
    fn from(input: CreatePermission) -> Self {
        let mut permission = Permission::new(input.scope_id, input.action, input.row_access);
        permission.description = input.description;
        permission
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePermission {
    pub scope_id: Option<Uuid>,
    pub action: Option<Action>,
    pub row_access: Option<RowAccess>,
    pub description: Option<String>,
}

impl UpdatePermission {
    pub fn apply_to(self, permission: &mut Permission) {
        if let Some(scope_id) = self.scope_id {
            permission.scope_id = scope_id;
        }
        if let Some(action) = self.action {
            permission.action = action;
        }
        if let Some(row_access) = self.row_access {
            permission.row_access = row_access;
        }
        if let Some(description) = self.description {
            permission.description = description;
        }
        permission.updated_at = Utc::now();
    }
}

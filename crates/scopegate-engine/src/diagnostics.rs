//! Human-readable summaries of effective permissions.

use std::collections::BTreeMap;
use std::fmt;

use scopegate_core::cache::CacheBackend;
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateError, ScopegateResult};
use scopegate_core::models::access::{AccessLevel, Action};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::AccessEngine;
use crate::permissions::PermissionCatalog;
use crate::registry::FieldSource;

/// What one profile may do on one entity type, per action and level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSummary {
    pub profile_id: Uuid,
    pub username: String,
    pub entity_type: String,
    pub actions: BTreeMap<Action, BTreeMap<AccessLevel, Vec<String>>>,
}

impl PermissionSummary {
    pub fn build<S: CatalogReader, C: CacheBackend>(
        engine: &AccessEngine<S, C>,
        profile_id: Uuid,
        entity_type: &str,
    ) -> ScopegateResult<Self> {
        let profile = engine
            .catalog()
            .profile(profile_id)?
            .ok_or_else(|| ScopegateError::not_found("profile", profile_id))?;

        let mut actions = BTreeMap::new();
        for action in Action::ALL {
            let access = engine.get_allowed_fields_with_access(profile_id, entity_type, action)?;
            if access.is_empty() {
                continue;
            }
            let mut by_level: BTreeMap<AccessLevel, Vec<String>> = BTreeMap::new();
            for (field, level) in access {
                by_level.entry(level).or_default().push(field);
            }
            actions.insert(action, by_level);
        }

        Ok(Self {
            profile_id,
            username: profile.username,
            entity_type: entity_type.to_string(),
            actions,
        })
    }
}

impl fmt::Display for PermissionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} on {}", self.username, self.entity_type)?;
        if self.actions.is_empty() {
            return writeln!(f, "  (no access)");
        }
        for (action, by_level) in &self.actions {
            writeln!(f, "  {action}:")?;
            for (level, fields) in by_level.iter().rev() {
                writeln!(f, "    {level}: {}", fields.join(", "))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub name: String,
    pub staff_only: bool,
    /// `scope_code:action(row_access)` per granted permission.
    pub permissions: Vec<String>,
}

/// Every role and the permissions it expands to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RbacSummary {
    pub roles: Vec<RoleSummary>,
}

impl RbacSummary {
    pub fn build<S: CatalogReader, C: CacheBackend>(
        engine: &AccessEngine<S, C>,
    ) -> ScopegateResult<Self> {
        let catalog = engine.catalog();
        let mut roles = Vec::new();
        for role in catalog.roles()? {
            let ids = engine.cache().role_permission_ids(role.id)?;
            let mut permissions = Vec::new();
            for permission in PermissionCatalog::new(catalog).permissions(&ids)? {
                let code = catalog
                    .scope(permission.scope_id)?
                    .map_or_else(|| "?".to_string(), |s| s.code);
                permissions.push(format!(
                    "{code}:{}({})",
                    permission.action, permission.row_access
                ));
            }
            permissions.sort();
            roles.push(RoleSummary {
                name: role.name,
                staff_only: role.staff_only,
                permissions,
            });
        }
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { roles })
    }
}

impl fmt::Display for RbacSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for role in &self.roles {
            let marker = if role.staff_only { " [staff]" } else { "" };
            writeln!(f, "{}{marker}", role.name)?;
            for permission in &role.permissions {
                writeln!(f, "  {permission}")?;
            }
        }
        Ok(())
    }
}

/// Explain where `field` of scope `scope_code` comes from.
pub fn explain_field<S: CatalogReader, C: CacheBackend>(
    engine: &AccessEngine<S, C>,
    scope_code: &str,
    field: &str,
) -> ScopegateResult<FieldSource> {
    let scope = engine
        .catalog()
        .scope_by_code(scope_code)?
        .ok_or_else(|| ScopegateError::not_found("scope", scope_code))?;
    engine.cache().registry().trace_field_source(&scope, field)
}

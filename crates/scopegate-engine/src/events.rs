//! Catalog change notifications.
//!
//! Write paths return the events their change implies. Forwarding them to
//! [`AccessEngine::apply`](crate::AccessEngine::apply) keeps every cache
//! tier consistent with the catalog.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum CatalogEvent {
    ScopeChanged(Uuid),
    PermissionChanged(Uuid),
    BundleChanged(Uuid),
    RoleCreated(Uuid),
    RolePermissionsChanged(Uuid),
    RoleDeleted(Uuid),
    ProfileCreated(Uuid),
    ProfileMembershipChanged(Uuid),
    ProfileDeleted(Uuid),
    /// Carries the entity type whose schema was registered or replaced.
    SchemaChanged(String),
}

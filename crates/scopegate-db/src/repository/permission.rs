//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use scopegate_core::error::ScopegateResult;
use scopegate_core::models::permission::{CreatePermission, Permission, UpdatePermission};
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::PermissionRepository;
use scopegate_engine::permissions::PermissionCatalog;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::edges::{CONTAINS, GRANTS, HOLDS};
use super::{parse_enum, parse_uuid};
use crate::error::DbError;
use crate::snapshot::load_snapshot;

#[derive(Debug, SurrealValue)]
struct PermissionContent {
    scope_id: String,
    action: String,
    row_access: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Permission> for PermissionContent {
    fn from(permission: &Permission) -> Self {
        Self {
            scope_id: permission.scope_id.to_string(),
            action: permission.action.as_str().to_string(),
            row_access: permission.row_access.as_str().to_string(),
            description: permission.description.clone(),
            created_at: permission.created_at,
            updated_at: permission.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct PermissionRowWithId {
    record_id: String,
    scope_id: String,
    action: String,
    row_access: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PermissionRowWithId {
    fn try_into_permission(self) -> Result<Permission, DbError> {
        Ok(Permission {
            id: parse_uuid(&self.record_id, "permission")?,
            scope_id: parse_uuid(&self.scope_id, "scope")?,
            action: parse_enum(&self.action)?,
            row_access: parse_enum(&self.row_access)?,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// The scope must exist and no other permission may grant the same
    /// (scope, action, row access) triple.
    async fn validate(&self, permission: &Permission, except: Option<Uuid>) -> ScopegateResult<()> {
        let snapshot = load_snapshot(&self.db, SchemaRegistry::new()).await?;
        snapshot.require_scope(permission.scope_id)?;
        PermissionCatalog::new(&snapshot).ensure_unique(
            permission.scope_id,
            permission.action,
            permission.row_access,
            except,
        )
    }

    async fn write(&self, permission: &Permission, verb: &str) -> Result<(), DbError> {
        self.db
            .query(format!("{verb} type::record('permission', $id) CONTENT $content"))
            .bind(("id", permission.id.to_string()))
            .bind(("content", PermissionContent::from(permission)))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> ScopegateResult<Permission> {
        let permission = Permission::from(input);
        self.validate(&permission, None).await?;
        self.write(&permission, "CREATE").await?;
        info!(
            id = %permission.id,
            action = %permission.action,
            row_access = %permission.row_access,
            "permission created"
        );
        Ok(permission)
    }

    async fn get_by_id(&self, id: Uuid) -> ScopegateResult<Permission> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('permission', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id.to_string(),
        })?;
        Ok(row.try_into_permission()?)
    }

    async fn update(&self, id: Uuid, input: UpdatePermission) -> ScopegateResult<Permission> {
        let mut permission = self.get_by_id(id).await?;
        input.apply_to(&mut permission);
        self.validate(&permission, Some(id)).await?;
        self.write(&permission, "UPDATE").await?;
        info!(%id, "permission updated");
        Ok(permission)
    }

    /// Also drops the permission from every role, bundle and profile.
    async fn delete(&self, id: Uuid) -> ScopegateResult<()> {
        self.get_by_id(id).await?;

        let mut query = String::new();
        for edge in [GRANTS, CONTAINS, HOLDS] {
            query.push_str(&edge.detach_statement("permission", id));
        }
        query.push_str("DELETE type::record('permission', $id);");
        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        info!(%id, "permission deleted");
        Ok(())
    }

    async fn list_by_scope(&self, scope_id: Uuid) -> ScopegateResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE scope_id = $scope_id ORDER BY action ASC, row_access ASC",
            )
            .bind(("scope_id", scope_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(PermissionRowWithId::try_into_permission)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn all(&self) -> ScopegateResult<Vec<Permission>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM permission")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(PermissionRowWithId::try_into_permission)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}

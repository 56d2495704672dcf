//! SurrealDB implementation of [`RoleRepository`].

use chrono::{DateTime, Utc};
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::role::{CreateRole, Role, UpdateRole};
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::{PaginatedResult, Pagination, RoleRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::edges::{GRANTS, HAS_ROLE, USES_BUNDLE};
use super::{CountRow, parse_uuid};
use crate::error::DbError;
use crate::snapshot::load_snapshot;

#[derive(Debug, SurrealValue)]
struct RoleContent {
    name: String,
    description: String,
    staff_only: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct RoleRowWithId {
    record_id: String,
    name: String,
    description: String,
    staff_only: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRowWithId {
    /// Grants live on `grants`/`uses_bundle` edges and are filled in later.
    fn try_into_role(self) -> Result<Role, DbError> {
        Ok(Role {
            id: parse_uuid(&self.record_id, "role")?,
            name: self.name,
            description: self.description,
            staff_only: self.staff_only,
            permission_ids: Default::default(),
            bundle_ids: Default::default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Role repository.
#[derive(Clone)]
pub struct SurrealRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn validate(&self, role: &Role) -> ScopegateResult<()> {
        let snapshot = load_snapshot(&self.db, SchemaRegistry::new()).await?;
        if snapshot
            .roles
            .values()
            .any(|r| r.name == role.name && r.id != role.id)
        {
            return Err(ValidationError::DuplicateName {
                entity: "role",
                name: role.name.clone(),
            }
            .into());
        }
        snapshot.require_permissions(&role.permission_ids)?;
        snapshot.require_bundles(&role.bundle_ids)
    }

    async fn write(&self, role: &Role, verb: &str) -> Result<(), DbError> {
        self.db
            .query(format!("{verb} type::record('role', $id) CONTENT $content"))
            .bind(("id", role.id.to_string()))
            .bind((
                "content",
                RoleContent {
                    name: role.name.clone(),
                    description: role.description.clone(),
                    staff_only: role.staff_only,
                    created_at: role.created_at,
                    updated_at: role.updated_at,
                },
            ))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        GRANTS.replace(&self.db, role.id, &role.permission_ids).await?;
        USES_BUNDLE.replace(&self.db, role.id, &role.bundle_ids).await
    }

    async fn hydrate(&self, rows: Vec<RoleRowWithId>) -> Result<Vec<Role>, DbError> {
        let mut grants = GRANTS.all(&self.db).await?;
        let mut bundles = USES_BUNDLE.all(&self.db).await?;
        let mut roles = Vec::with_capacity(rows.len());
        for row in rows {
            let mut role = row.try_into_role()?;
            role.permission_ids = grants.remove(&role.id).unwrap_or_default();
            role.bundle_ids = bundles.remove(&role.id).unwrap_or_default();
            roles.push(role);
        }
        Ok(roles)
    }
}

impl<C: Connection> RoleRepository for SurrealRoleRepository<C> {
    async fn create(&self, input: CreateRole) -> ScopegateResult<Role> {
        let role = Role::from(input);
        self.validate(&role).await?;
        self.write(&role, "CREATE").await?;
        info!(role = %role.name, staff_only = role.staff_only, "role created");
        Ok(role)
    }

    async fn get_by_id(&self, id: Uuid) -> ScopegateResult<Role> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('role', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "role".into(),
            id: id.to_string(),
        })?;

        let mut role = row.try_into_role()?;
        role.permission_ids = GRANTS.targets(&self.db, id).await?;
        role.bundle_ids = USES_BUNDLE.targets(&self.db, id).await?;
        Ok(role)
    }

    async fn update(&self, id: Uuid, input: UpdateRole) -> ScopegateResult<Role> {
        let mut role = self.get_by_id(id).await?;
        input.apply_to(&mut role);
        self.validate(&role).await?;
        self.write(&role, "UPDATE").await?;
        info!(role = %role.name, "role updated");
        Ok(role)
    }

    /// Also takes the role away from every profile holding it.
    async fn delete(&self, id: Uuid) -> ScopegateResult<()> {
        let role = self.get_by_id(id).await?;
        let query = format!(
            "{}{}{}DELETE type::record('role', $id);",
            GRANTS.detach_statement("role", id),
            USES_BUNDLE.detach_statement("role", id),
            HAS_ROLE.detach_statement("role", id),
        );
        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        info!(role = %role.name, "role deleted");
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> ScopegateResult<PaginatedResult<Role>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM role GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM role \
                 ORDER BY name ASC LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: self.hydrate(rows).await?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn all(&self) -> ScopegateResult<Vec<Role>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM role ORDER BY name ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<RoleRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(self.hydrate(rows).await?)
    }
}

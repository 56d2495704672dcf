//! SurrealDB implementation of [`ScopeRepository`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::models::scope::{CreateScope, Scope, UpdateScope};
use scopegate_core::repository::{PaginatedResult, Pagination, ScopeRepository};
use scopegate_engine::registry::{DEFAULT_MAX_DEPTH, ScopeRegistry};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::edges::{CONTAINS, GRANTS, HOLDS};
use super::{CountRow, parse_enum, parse_uuid};
use crate::error::DbError;
use crate::snapshot::load_snapshot;

/// Stored columns of a scope, written with `CONTENT`.
#[derive(Debug, SurrealValue)]
struct ScopeContent {
    code: String,
    name: String,
    entity_type: String,
    parent_id: Option<String>,
    included_fields: Vec<String>,
    excluded_fields: Vec<String>,
    category: String,
    scope_group: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Scope> for ScopeContent {
    fn from(scope: &Scope) -> Self {
        Self {
            code: scope.code.clone(),
            name: scope.name.clone(),
            entity_type: scope.entity_type.clone(),
            parent_id: scope.parent_id.map(|p| p.to_string()),
            included_fields: scope.included_fields.iter().cloned().collect(),
            excluded_fields: scope.excluded_fields.iter().cloned().collect(),
            category: scope.category.as_str().to_string(),
            scope_group: scope.group.clone(),
            is_active: scope.is_active,
            created_at: scope.created_at,
            updated_at: scope.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct ScopeRowWithId {
    record_id: String,
    code: String,
    name: String,
    entity_type: String,
    parent_id: Option<String>,
    included_fields: Vec<String>,
    excluded_fields: Vec<String>,
    category: String,
    scope_group: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScopeRowWithId {
    fn try_into_scope(self) -> Result<Scope, DbError> {
        Ok(Scope {
            id: parse_uuid(&self.record_id, "scope")?,
            code: self.code,
            name: self.name,
            entity_type: self.entity_type,
            parent_id: self
                .parent_id
                .as_deref()
                .map(|p| parse_uuid(p, "parent scope"))
                .transpose()?,
            included_fields: self.included_fields.into_iter().collect(),
            excluded_fields: self.excluded_fields.into_iter().collect(),
            category: parse_enum(&self.category)?,
            group: self.scope_group,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Scope repository.
///
/// Every write validates the resulting tree against a freshly loaded
/// catalog snapshot and the registered entity schemas.
#[derive(Clone)]
pub struct SurrealScopeRepository<C: Connection> {
    db: Surreal<C>,
    schemas: Arc<SchemaRegistry>,
    max_depth: usize,
}

impl<C: Connection> SurrealScopeRepository<C> {
    pub fn new(db: Surreal<C>, schemas: SchemaRegistry) -> Self {
        Self {
            db,
            schemas: Arc::new(schemas),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_inheritance_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    async fn write(&self, scope: &Scope, verb: &str) -> Result<(), DbError> {
        self.db
            .query(format!("{verb} type::record('scope', $id) CONTENT $content"))
            .bind(("id", scope.id.to_string()))
            .bind(("content", ScopeContent::from(scope)))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }

    async fn validate(&self, scope: &Scope) -> ScopegateResult<()> {
        let snapshot = load_snapshot(&self.db, SchemaRegistry::clone(&self.schemas)).await?;
        ScopeRegistry::new(&snapshot)
            .with_max_depth(self.max_depth)
            .validate(scope)
    }

    async fn select(&self, query: &str, bindings: Vec<(&'static str, String)>) -> Result<Vec<Scope>, DbError> {
        let mut builder = self.db.query(query);
        for binding in bindings {
            builder = builder.bind(binding);
        }
        let mut result = builder.await?;
        let rows: Vec<ScopeRowWithId> = result.take(0)?;
        rows.into_iter().map(ScopeRowWithId::try_into_scope).collect()
    }
}

impl<C: Connection> ScopeRepository for SurrealScopeRepository<C> {
    async fn create(&self, input: CreateScope) -> ScopegateResult<Scope> {
        let scope = Scope::from(input);
        let snapshot = load_snapshot(&self.db, SchemaRegistry::clone(&self.schemas)).await?;
        if snapshot.scope_by_code(&scope.code)?.is_some() {
            return Err(ValidationError::DuplicateName {
                entity: "scope",
                name: scope.code,
            }
            .into());
        }
        ScopeRegistry::new(&snapshot)
            .with_max_depth(self.max_depth)
            .validate(&scope)?;

        self.write(&scope, "CREATE").await?;
        info!(scope = %scope.code, id = %scope.id, "scope created");
        Ok(scope)
    }

    async fn get_by_id(&self, id: Uuid) -> ScopegateResult<Scope> {
        let scopes = self
            .select(
                "SELECT meta::id(id) AS record_id, * FROM type::record('scope', $id)",
                vec![("id", id.to_string())],
            )
            .await?;
        scopes.into_iter().next().ok_or_else(|| {
            DbError::NotFound {
                entity: "scope".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn get_by_code(&self, code: &str) -> ScopegateResult<Scope> {
        let scopes = self
            .select(
                "SELECT meta::id(id) AS record_id, * FROM scope WHERE code = $code",
                vec![("code", code.to_string())],
            )
            .await?;
        scopes.into_iter().next().ok_or_else(|| {
            DbError::NotFound {
                entity: "scope".into(),
                id: code.to_string(),
            }
            .into()
        })
    }

    async fn update(&self, id: Uuid, input: UpdateScope) -> ScopegateResult<Scope> {
        let mut scope = self.get_by_id(id).await?;
        input.apply_to(&mut scope);
        self.validate(&scope).await?;

        self.write(&scope, "UPDATE").await?;
        info!(scope = %scope.code, "scope updated");
        Ok(scope)
    }

    /// Leaf scopes only. The scope's permissions and their edges go with it.
    async fn delete(&self, id: Uuid) -> ScopegateResult<()> {
        let scope = self.get_by_id(id).await?;
        let children = self
            .select(
                "SELECT meta::id(id) AS record_id, * FROM scope WHERE parent_id = $id",
                vec![("id", id.to_string())],
            )
            .await?;
        if !children.is_empty() {
            return Err(ValidationError::ScopeHasChildren { scope: scope.code }.into());
        }

        let mut result = self
            .db
            .query("SELECT VALUE meta::id(id) FROM permission WHERE scope_id = $id")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let permission_ids: Vec<String> = result.take(0).map_err(DbError::from)?;

        let mut query = String::new();
        for pid in &permission_ids {
            let pid = parse_uuid(pid, "permission")?;
            for edge in [GRANTS, CONTAINS, HOLDS] {
                query.push_str(&edge.detach_statement("permission", pid));
            }
        }
        query.push_str(
            "DELETE permission WHERE scope_id = $id; \
             DELETE type::record('scope', $id);",
        );
        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        info!(scope = %scope.code, permissions = permission_ids.len(), "scope deleted");
        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> ScopegateResult<PaginatedResult<Scope>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM scope GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM scope \
                 ORDER BY code ASC LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ScopeRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(ScopeRowWithId::try_into_scope)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn all(&self) -> ScopegateResult<Vec<Scope>> {
        Ok(self
            .select("SELECT meta::id(id) AS record_id, * FROM scope", Vec::new())
            .await?)
    }
}

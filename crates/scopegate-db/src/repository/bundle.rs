//! SurrealDB implementation of [`GrantBundleRepository`].

use chrono::{DateTime, Utc};
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::bundle::{CreateGrantBundle, GrantBundle, UpdateGrantBundle};
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::GrantBundleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::edges::{CONTAINS, USES_BUNDLE};
use super::parse_uuid;
use crate::error::DbError;
use crate::snapshot::load_snapshot;

#[derive(Debug, SurrealValue)]
struct BundleContent {
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct BundleRowWithId {
    record_id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BundleRowWithId {
    /// Permission ids live on `contains` edges and are filled in later.
    fn try_into_bundle(self) -> Result<GrantBundle, DbError> {
        Ok(GrantBundle {
            id: parse_uuid(&self.record_id, "grant bundle")?,
            name: self.name,
            description: self.description,
            permission_ids: Default::default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the grant bundle repository.
#[derive(Clone)]
pub struct SurrealGrantBundleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGrantBundleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn validate(&self, bundle: &GrantBundle) -> ScopegateResult<()> {
        let snapshot = load_snapshot(&self.db, SchemaRegistry::new()).await?;
        if snapshot
            .bundles
            .values()
            .any(|b| b.name == bundle.name && b.id != bundle.id)
        {
            return Err(ValidationError::DuplicateName {
                entity: "grant bundle",
                name: bundle.name.clone(),
            }
            .into());
        }
        snapshot.require_permissions(&bundle.permission_ids)
    }

    async fn write(&self, bundle: &GrantBundle, verb: &str) -> Result<(), DbError> {
        self.db
            .query(format!("{verb} type::record('grant_bundle', $id) CONTENT $content"))
            .bind(("id", bundle.id.to_string()))
            .bind((
                "content",
                BundleContent {
                    name: bundle.name.clone(),
                    description: bundle.description.clone(),
                    created_at: bundle.created_at,
                    updated_at: bundle.updated_at,
                },
            ))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        CONTAINS
            .replace(&self.db, bundle.id, &bundle.permission_ids)
            .await
    }
}

impl<C: Connection> GrantBundleRepository for SurrealGrantBundleRepository<C> {
    async fn create(&self, input: CreateGrantBundle) -> ScopegateResult<GrantBundle> {
        let bundle = GrantBundle::from(input);
        self.validate(&bundle).await?;
        self.write(&bundle, "CREATE").await?;
        info!(bundle = %bundle.name, permissions = bundle.permission_ids.len(), "grant bundle created");
        Ok(bundle)
    }

    async fn get_by_id(&self, id: Uuid) -> ScopegateResult<GrantBundle> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('grant_bundle', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<BundleRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "grant bundle".into(),
            id: id.to_string(),
        })?;

        let mut bundle = row.try_into_bundle()?;
        bundle.permission_ids = CONTAINS.targets(&self.db, id).await?;
        Ok(bundle)
    }

    async fn update(&self, id: Uuid, input: UpdateGrantBundle) -> ScopegateResult<GrantBundle> {
        let mut bundle = self.get_by_id(id).await?;
        input.apply_to(&mut bundle);
        self.validate(&bundle).await?;
        self.write(&bundle, "UPDATE").await?;
        info!(bundle = %bundle.name, "grant bundle updated");
        Ok(bundle)
    }

    /// Also detaches the bundle from every role.
    async fn delete(&self, id: Uuid) -> ScopegateResult<()> {
        let bundle = self.get_by_id(id).await?;
        let query = format!(
            "{}{}DELETE type::record('grant_bundle', $id);",
            CONTAINS.detach_statement("grant_bundle", id),
            USES_BUNDLE.detach_statement("grant_bundle", id),
        );
        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        info!(bundle = %bundle.name, "grant bundle deleted");
        Ok(())
    }

    async fn all(&self) -> ScopegateResult<Vec<GrantBundle>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM grant_bundle ORDER BY name ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<BundleRowWithId> = result.take(0).map_err(DbError::from)?;
        let mut contents = CONTAINS.all(&self.db).await?;

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let mut bundle = row.try_into_bundle()?;
            bundle.permission_ids = contents.remove(&bundle.id).unwrap_or_default();
            bundles.push(bundle);
        }
        Ok(bundles)
    }
}

//! SurrealDB connection management.

use scopegate_core::error::ScopegateResult;
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_engine::registry::DEFAULT_MAX_DEPTH;
use scopegate_engine::snapshot::CatalogSnapshot;
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{
    SurrealGrantBundleRepository, SurrealPermissionRepository, SurrealProfileRepository,
    SurrealRoleRepository, SurrealScopeRepository,
};
use crate::schema::run_migrations;
use crate::snapshot::load_snapshot;

/// Root credentials for a SurrealDB server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Where the catalog lives and how to reach it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Endpoint understood by the `any` engine: `ws://127.0.0.1:8000` for a
    /// server, `mem://` for an embedded in-memory store.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Signed in as root when set. Embedded stores need none.
    pub credentials: Option<Credentials>,
    /// Longest scope chain the scope repository accepts.
    pub max_inheritance_depth: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "scopegate".into(),
            database: "catalog".into(),
            credentials: Some(Credentials {
                username: "root".into(),
                password: "root".into(),
            }),
            max_inheritance_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DbConfig {
    pub fn in_memory() -> Self {
        Self {
            endpoint: "mem://".into(),
            credentials: None,
            ..Self::default()
        }
    }
}

/// An open, migrated catalog database and the repositories over it.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
    max_depth: usize,
}

impl DbManager {
    /// Open the configured endpoint, select the namespace and database and
    /// bring the catalog schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "opening catalog database"
        );

        let db = any::connect(config.endpoint.as_str()).await?;
        if let Some(credentials) = &config.credentials {
            db.signin(Root {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            })
            .await?;
        }
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        let applied = run_migrations(&db).await?;
        info!(applied, "catalog database ready");

        Ok(Self {
            db,
            max_depth: config.max_inheritance_depth,
        })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }

    pub fn scopes(&self, schemas: SchemaRegistry) -> SurrealScopeRepository<Any> {
        SurrealScopeRepository::new(self.db.clone(), schemas)
            .with_max_inheritance_depth(self.max_depth)
    }

    pub fn permissions(&self) -> SurrealPermissionRepository<Any> {
        SurrealPermissionRepository::new(self.db.clone())
    }

    pub fn bundles(&self) -> SurrealGrantBundleRepository<Any> {
        SurrealGrantBundleRepository::new(self.db.clone())
    }

    pub fn roles(&self) -> SurrealRoleRepository<Any> {
        SurrealRoleRepository::new(self.db.clone())
    }

    pub fn profiles(&self) -> SurrealProfileRepository<Any> {
        SurrealProfileRepository::new(self.db.clone())
    }

    /// The whole catalog, ready for `InMemoryCatalog::new` or `replace`.
    pub async fn snapshot(&self, schemas: SchemaRegistry) -> ScopegateResult<CatalogSnapshot> {
        load_snapshot(&self.db, schemas).await
    }
}

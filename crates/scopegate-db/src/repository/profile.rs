//! SurrealDB implementation of [`ProfileRepository`].

use chrono::{DateTime, Utc};
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::profile::{CreateProfile, Profile, ProfileKind, UpdateProfile};
use scopegate_core::models::schema::SchemaRegistry;
use scopegate_core::repository::{PaginatedResult, Pagination, ProfileRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::edges::{HAS_ROLE, HOLDS};
use super::{CountRow, parse_enum, parse_uuid};
use crate::error::DbError;
use crate::snapshot::load_snapshot;

#[derive(Debug, SurrealValue)]
struct ProfileContent {
    kind: String,
    username: String,
    email: String,
    is_active: bool,
    profile_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Profile> for ProfileContent {
    fn from(profile: &Profile) -> Self {
        Self {
            kind: profile.kind.as_str().to_string(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            is_active: profile.is_active,
            profile_type: profile.profile_type.clone(),
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct ProfileRowWithId {
    record_id: String,
    kind: String,
    username: String,
    email: String,
    is_active: bool,
    profile_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRowWithId {
    fn try_into_profile(self) -> Result<Profile, DbError> {
        Ok(Profile {
            id: parse_uuid(&self.record_id, "profile")?,
            kind: parse_enum(&self.kind)?,
            username: self.username,
            email: self.email,
            is_active: self.is_active,
            profile_type: self.profile_type,
            role_ids: Default::default(),
            permission_ids: Default::default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Profile repository.
#[derive(Clone)]
pub struct SurrealProfileRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealProfileRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Usernames are unique per profile kind. Roles and direct grants must
    /// exist and staff-only roles never go to members.
    async fn validate(&self, profile: &Profile) -> ScopegateResult<()> {
        let snapshot = load_snapshot(&self.db, SchemaRegistry::new()).await?;
        if snapshot.profiles.values().any(|p| {
            p.kind == profile.kind && p.username == profile.username && p.id != profile.id
        }) {
            return Err(ValidationError::DuplicateName {
                entity: "profile",
                name: profile.username.clone(),
            }
            .into());
        }
        snapshot.check_profile(profile)
    }

    async fn write(&self, profile: &Profile, verb: &str) -> Result<(), DbError> {
        self.db
            .query(format!("{verb} type::record('profile', $id) CONTENT $content"))
            .bind(("id", profile.id.to_string()))
            .bind(("content", ProfileContent::from(profile)))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        HAS_ROLE.replace(&self.db, profile.id, &profile.role_ids).await?;
        HOLDS
            .replace(&self.db, profile.id, &profile.permission_ids)
            .await
    }

    async fn hydrate(&self, rows: Vec<ProfileRowWithId>) -> Result<Vec<Profile>, DbError> {
        let mut roles = HAS_ROLE.all(&self.db).await?;
        let mut grants = HOLDS.all(&self.db).await?;
        let mut profiles = Vec::with_capacity(rows.len());
        for row in rows {
            let mut profile = row.try_into_profile()?;
            profile.role_ids = roles.remove(&profile.id).unwrap_or_default();
            profile.permission_ids = grants.remove(&profile.id).unwrap_or_default();
            profiles.push(profile);
        }
        Ok(profiles)
    }
}

impl<C: Connection> ProfileRepository for SurrealProfileRepository<C> {
    async fn create(&self, input: CreateProfile) -> ScopegateResult<Profile> {
        let profile = Profile::from(input);
        self.validate(&profile).await?;
        self.write(&profile, "CREATE").await?;
        info!(
            profile = %profile.username,
            kind = %profile.kind,
            profile_type = %profile.profile_type,
            "profile created"
        );
        Ok(profile)
    }

    async fn get_by_id(&self, id: Uuid) -> ScopegateResult<Profile> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('profile', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ProfileRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "profile".into(),
            id: id.to_string(),
        })?;

        let mut profile = row.try_into_profile()?;
        profile.role_ids = HAS_ROLE.targets(&self.db, id).await?;
        profile.permission_ids = HOLDS.targets(&self.db, id).await?;
        Ok(profile)
    }

    async fn update(&self, id: Uuid, input: UpdateProfile) -> ScopegateResult<Profile> {
        let mut profile = self.get_by_id(id).await?;
        input.apply_to(&mut profile);
        self.validate(&profile).await?;
        self.write(&profile, "UPDATE").await?;
        info!(profile = %profile.username, "profile updated");
        Ok(profile)
    }

    async fn delete(&self, id: Uuid) -> ScopegateResult<()> {
        let profile = self.get_by_id(id).await?;
        let query = format!(
            "{}{}DELETE type::record('profile', $id);",
            HAS_ROLE.detach_statement("profile", id),
            HOLDS.detach_statement("profile", id),
        );
        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        info!(profile = %profile.username, "profile deleted");
        Ok(())
    }

    async fn list(
        &self,
        kind: Option<ProfileKind>,
        pagination: Pagination,
    ) -> ScopegateResult<PaginatedResult<Profile>> {
        let filter = if kind.is_some() {
            "WHERE kind = $kind"
        } else {
            ""
        };
        let kind = kind.map(|k| k.as_str().to_string());

        let mut count_result = self
            .db
            .query(format!(
                "SELECT count() AS total FROM profile {filter} GROUP ALL"
            ))
            .bind(("kind", kind.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM profile {filter} \
                 ORDER BY username ASC LIMIT $limit START $offset"
            ))
            .bind(("kind", kind))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ProfileRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: self.hydrate(rows).await?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn all(&self) -> ScopegateResult<Vec<Profile>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM profile ORDER BY username ASC")
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ProfileRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(self.hydrate(rows).await?)
    }
}

//! Profile domain model.
//!
//! Profiles are the authenticated actors. Two variants exist, each with its
//! own `profile_type` vocabulary and rank table.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Member,
    Staff,
}

const MEMBER_RANKS: &[(&str, u8)] = &[("tourist", 1), ("real", 2)];
const STAFF_RANKS: &[(&str, u8)] = &[("staff", 1), ("admin", 2)];

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Member => "member",
            ProfileKind::Staff => "staff",
        }
    }

    /// Entity type under which records of this profile kind are stored.
    pub fn entity_type(self) -> &'static str {
        self.as_str()
    }

    /// `profile_type → rank` table of this variant.
    pub fn type_ranks(self) -> &'static [(&'static str, u8)] {
        match self {
            ProfileKind::Member => MEMBER_RANKS,
            ProfileKind::Staff => STAFF_RANKS,
        }
    }

    pub fn rank_of(self, profile_type: &str) -> Option<u8> {
        self.type_ranks()
            .iter()
            .find(|(name, _)| *name == profile_type)
            .map(|(_, rank)| *rank)
    }

    pub fn default_type(self) -> &'static str {
        self.type_ranks()[0].0
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(ProfileKind::Member),
            "staff" => Ok(ProfileKind::Staff),
            other => Err(ValidationError::UnknownValue {
                kind: "profile kind",
                value: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub kind: ProfileKind,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub is_active: bool,
    /// Variant-specific type, e.g. `tourist` or `admin`.
    pub profile_type: String,
    #[serde(default)]
    pub role_ids: BTreeSet<Uuid>,
    /// Permissions granted to this profile directly.
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(kind: ProfileKind, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            username: username.into(),
            email: String::new(),
            is_active: true,
            profile_type: kind.default_type().to_string(),
            role_ids: BTreeSet::new(),
            permission_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(username: impl Into<String>) -> Self {
        Self::new(ProfileKind::Member, username)
    }

    pub fn staff(username: impl Into<String>) -> Self {
        Self::new(ProfileKind::Staff, username)
    }

    pub fn with_type(mut self, profile_type: impl Into<String>) -> Self {
        self.profile_type = profile_type.into();
        self
    }

    pub fn with_roles(mut self, role_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.role_ids.extend(role_ids);
        self
    }

    pub fn granting(mut self, permission_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.permission_ids.extend(permission_ids);
        self
    }

    /// Rank of this profile's type within its own variant.
    pub fn rank(&self) -> Option<u8> {
        self.kind.rank_of(&self.profile_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProfile {
    pub kind: ProfileKind,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub profile_type: Option<String>,
    #[serde(default)]
    pub role_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub permission_ids: BTreeSet<Uuid>,
}

impl From<CreateProfile> for Profile {
    fn from(input: CreateProfile) -> Self {
        let mut profile = Profile::new(input.kind, input.username)
            .with_roles(input.role_ids)
            .granting(input.permission_ids);
        profile.email = input.email;
        if let Some(profile_type) = input.profile_type {
            profile.profile_type = profile_type;
        }
        profile
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub profile_type: Option<String>,
    pub role_ids: Option<BTreeSet<Uuid>>,
    pub permission_ids: Option<BTreeSet<Uuid>>,
}

impl UpdateProfile {
    /// True when the update changes the profile's roles or direct grants.
    pub fn changes_membership(&self) -> bool {
        self.role_ids.is_some() || self.permission_ids.is_some()
    }

    pub fn apply_to(self, profile: &mut Profile) {
        if let Some(username) = self.username {
            profile.username = username;
        }
        if let Some(email) = self.email {
            profile.email = email;
        }
        if let Some(is_active) = self.is_active {
            profile.is_active = is_active;
        }
        if let Some(profile_type) = self.profile_type {
            profile.profile_type = profile_type;
        }
        if let Some(role_ids) = self.role_ids {
            profile.role_ids = role_ids;
        }
        if let Some(permission_ids) = self.permission_ids {
            profile.permission_ids = permission_ids;
        }
        profile.updated_at = Utc::now();
    }
}

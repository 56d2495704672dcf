//! Actions, row-access grants and per-field access levels.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The operation a permission grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Get,
    Update,
    Delete,
    Export,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Get,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Get => "get",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "get" => Ok(Action::Get),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "export" => Ok(Action::Export),
            other => Err(ValidationError::UnknownValue {
                kind: "action",
                value: other.into(),
            }),
        }
    }
}

/// Which rows a permission opens up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowAccess {
    All,
    ProfileHierarchy,
    Own,
}

impl RowAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            RowAccess::All => "all",
            RowAccess::ProfileHierarchy => "profile_hierarchy",
            RowAccess::Own => "own",
        }
    }

    /// The access level a field receives from a permission with this row access.
    pub fn level(self) -> AccessLevel {
        match self {
            RowAccess::All => AccessLevel::All,
            RowAccess::ProfileHierarchy => AccessLevel::ProfileHierarchy,
            RowAccess::Own => AccessLevel::Own,
        }
    }
}

impl fmt::Display for RowAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowAccess {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(RowAccess::All),
            "profile_hierarchy" => Ok(RowAccess::ProfileHierarchy),
            "own" => Ok(RowAccess::Own),
            other => Err(ValidationError::UnknownValue {
                kind: "row access",
                value: other.into(),
            }),
        }
    }
}

/// Per-field visibility level. Ordered `None < Own < ProfileHierarchy < All`
/// and encoded in two bits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AccessLevel {
    #[default]
    None = 0,
    Own = 1,
    ProfileHierarchy = 2,
    All = 3,
}

impl AccessLevel {
    /// Decode the two low bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => AccessLevel::None,
            1 => AccessLevel::Own,
            2 => AccessLevel::ProfileHierarchy,
            _ => AccessLevel::All,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::Own => "own",
            AccessLevel::ProfileHierarchy => "profile_hierarchy",
            AccessLevel::All => "all",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RowAccess> for AccessLevel {
    fn from(row_access: RowAccess) -> Self {
        row_access.level()
    }
}

/// Field name → access level for one (profile, entity type, action).
pub type FieldAccessMap = BTreeMap<String, AccessLevel>;

/// Highest level carried by any field of the map, `None` for an empty map.
pub fn max_level(map: &FieldAccessMap) -> AccessLevel {
    map.values().copied().max().unwrap_or_default()
}

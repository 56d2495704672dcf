//! Error types for the scopegate system.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::cache::CacheError;
use crate::models::access::{Action, RowAccess};

#[derive(Debug, Error)]
pub enum ScopegateError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScopegateError {
    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

pub type ScopegateResult<T> = Result<T, ScopegateError>;

/// Which field list of a scope an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldList {
    Included,
    Excluded,
}

impl fmt::Display for FieldList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldList::Included => f.write_str("included_fields"),
            FieldList::Excluded => f.write_str("excluded_fields"),
        }
    }
}

/// Write-time configuration errors. Each variant names the offending
/// record and the constraint it breaks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "scope '{scope}' cannot inherit from '{parent}': \
         entity type '{parent_entity_type}' differs from '{entity_type}'"
    )]
    ParentEntityTypeMismatch {
        scope: String,
        parent: String,
        entity_type: String,
        parent_entity_type: String,
    },

    #[error("scope '{scope}' would become its own ancestor")]
    InheritanceCycle { scope: String },

    #[error("scope '{scope}' has an inheritance chain of {depth}, the maximum is {max}")]
    InheritanceTooDeep {
        scope: String,
        depth: usize,
        max: usize,
    },

    #[error("scope '{scope}' refers to missing parent {parent_id}")]
    MissingParent { scope: String, parent_id: Uuid },

    #[error("scope '{scope}' still has child scopes")]
    ScopeHasChildren { scope: String },

    #[error("{list} of scope '{scope}' are not declared on '{entity_type}': {fields:?}")]
    UnknownFields {
        scope: String,
        entity_type: String,
        list: FieldList,
        fields: Vec<String>,
    },

    #[error("no field schema is registered for entity type '{entity_type}'")]
    UnknownEntityType { entity_type: String },

    #[error(
        "entity type '{entity_type}' declares {count} public fields, \
         a field mask holds at most {max}"
    )]
    TooManyFields {
        entity_type: String,
        count: usize,
        max: usize,
    },

    #[error("permission ({scope_id}, {action}, {row_access}) already exists")]
    DuplicatePermission {
        scope_id: Uuid,
        action: Action,
        row_access: RowAccess,
    },

    #[error("{entity} '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("role '{role}' is staff-only and cannot be held by member '{profile}'")]
    RoleNotAssignable { role: String, profile: String },

    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },
}

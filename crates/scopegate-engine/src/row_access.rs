//! Record-level visibility.
//!
//! The resolver turns a field access map into a [`RowPredicate`]. The
//! predicate is plain data: a storage layer can translate it into its own
//! filter, or evaluate it against any [`RecordView`].

use std::borrow::Cow;
use std::collections::BTreeSet;

use scopegate_core::models::access::{AccessLevel, FieldAccessMap, max_level};
use scopegate_core::models::profile::Profile;
use scopegate_core::models::schema::{EntitySchema, Ownership};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

/// Read access to the fields of a stored record.
pub trait RecordView {
    /// Textual value of `field`, `None` when absent or not scalar.
    fn field_text(&self, field: &str) -> Option<Cow<'_, str>>;

    fn field_uuid(&self, field: &str) -> Option<Uuid> {
        self.field_text(field)?.parse().ok()
    }
}

impl RecordView for Map<String, Value> {
    fn field_text(&self, field: &str) -> Option<Cow<'_, str>> {
        match self.get(field)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        }
    }
}

impl RecordView for Value {
    fn field_text(&self, field: &str) -> Option<Cow<'_, str>> {
        self.as_object()?.field_text(field)
    }
}

impl<T: RecordView + ?Sized> RecordView for &T {
    fn field_text(&self, field: &str) -> Option<Cow<'_, str>> {
        (**self).field_text(field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowPredicate {
    AllowAll,
    DenyAll,
    /// The record's identifier equals `id`.
    IdEquals { field: String, id: Uuid },
    /// The record's owner reference equals `owner_id`.
    OwnerEquals { field: String, owner_id: Uuid },
    /// The record's ranked type is one of `types`.
    TypeIn { field: String, types: BTreeSet<String> },
}

impl RowPredicate {
    pub fn matches<R: RecordView + ?Sized>(&self, record: &R) -> bool {
        match self {
            RowPredicate::AllowAll => true,
            RowPredicate::DenyAll => false,
            RowPredicate::IdEquals { field, id } => record.field_uuid(field) == Some(*id),
            RowPredicate::OwnerEquals { field, owner_id } => {
                record.field_uuid(field) == Some(*owner_id)
            }
            RowPredicate::TypeIn { field, types } => record
                .field_text(field)
                .is_some_and(|t| types.contains(t.as_ref())),
        }
    }

    /// Keep the records this predicate admits.
    pub fn filter<R: RecordView>(&self, records: impl IntoIterator<Item = R>) -> Vec<R> {
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Resolves the rows a profile may see for one entity type.
pub struct RowAccessResolver<'a> {
    profile: &'a Profile,
    schema: Option<&'a EntitySchema>,
    identifier_key: &'a str,
}

impl<'a> RowAccessResolver<'a> {
    pub fn new(profile: &'a Profile, schema: Option<&'a EntitySchema>) -> Self {
        Self {
            profile,
            schema,
            identifier_key: "id",
        }
    }

    pub fn with_identifier_key(mut self, identifier_key: &'a str) -> Self {
        self.identifier_key = identifier_key;
        self
    }

    /// Only the highest level in `access` matters, whichever field holds it.
    pub fn resolve(&self, access: &FieldAccessMap) -> RowPredicate {
        match max_level(access) {
            AccessLevel::All => RowPredicate::AllowAll,
            AccessLevel::ProfileHierarchy => self.hierarchy(),
            AccessLevel::Own => self.own(),
            AccessLevel::None => RowPredicate::DenyAll,
        }
    }

    fn hierarchy(&self) -> RowPredicate {
        let Some(hierarchy) = self.schema.and_then(|s| s.hierarchy.as_ref()) else {
            return self.own();
        };
        match hierarchy.rank_of(&self.profile.profile_type) {
            Some(rank) if rank > 0 => RowPredicate::TypeIn {
                field: hierarchy.type_field.clone(),
                types: hierarchy.types_up_to(rank).into_iter().collect(),
            },
            _ => self.own(),
        }
    }

    fn own(&self) -> RowPredicate {
        let ownership = self.schema.map(|s| &s.ownership);
        match ownership {
            Some(Ownership::SelfReferencing) => RowPredicate::IdEquals {
                field: self.identifier_key.to_string(),
                id: self.profile.id,
            },
            Some(Ownership::OwnerField(field)) => RowPredicate::OwnerEquals {
                field: field.clone(),
                owner_id: self.profile.id,
            },
            Some(Ownership::Unowned) | None => {
                warn!(
                    profile = %self.profile.username,
                    entity_type = self.schema.map(|s| s.entity_type.as_str()),
                    "own-record access on an entity type without ownership"
                );
                RowPredicate::DenyAll
            }
        }
    }
}

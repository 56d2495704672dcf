//! Explicit field schemas for the entity types under access control.
//!
//! The engine never reflects over storage models. Each entity type registers
//! an [`EntitySchema`] listing its fields, how records of that type are
//! owned and, optionally, which record field carries a ranked type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    /// Hidden fields are never exposed and never enter a field mask.
    #[serde(default)]
    pub hidden: bool,
    /// Public property name a storage field is exposed under, e.g. the
    /// decrypted `phone` behind an encrypted `_phone` column.
    #[serde(default)]
    pub property: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hidden: false,
            property: None,
        }
    }

    pub fn hidden(name: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::new(name)
        }
    }

    pub fn aliased(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            ..Self::new(name)
        }
    }

    /// Name under which the field is exposed, or `None` when it never is.
    pub fn public_name(&self) -> Option<&str> {
        if self.hidden {
            return None;
        }
        match &self.property {
            Some(property) => Some(property.as_str()),
            None if self.name.starts_with('_') => None,
            None => Some(self.name.as_str()),
        }
    }
}

/// Record field carrying a ranked type, and the rank table for its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub type_field: String,
    pub ranks: BTreeMap<String, u8>,
}

impl Hierarchy {
    pub fn new<I, S>(type_field: impl Into<String>, ranks: I) -> Self
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        Self {
            type_field: type_field.into(),
            ranks: ranks.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn rank_of(&self, value: &str) -> Option<u8> {
        self.ranks.get(value).copied()
    }

    /// Types whose rank is at most `rank`.
    pub fn types_up_to(&self, rank: u8) -> Vec<String> {
        self.ranks
            .iter()
            .filter(|(_, r)| **r <= rank)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// How a record of an entity type relates to a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum Ownership {
    /// Records of this type are profiles; a record is owned by the profile
    /// with the same id.
    SelfReferencing,
    /// Records carry the owning profile's id in the named field.
    OwnerField(String),
    #[default]
    Unowned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity_type: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub hierarchy: Option<Hierarchy>,
    #[serde(default)]
    pub ownership: Ownership,
}

fn default_version() -> u32 {
    1
}

impl EntitySchema {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            version: 1,
            fields: Vec::new(),
            hierarchy: None,
            ownership: Ownership::Unowned,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(FieldDef::new));
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Hierarchy) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    pub fn owned_by(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Sorted, de-duplicated public field names.
    pub fn public_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .iter()
            .filter_map(FieldDef::public_name)
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn declares(&self, public_name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.public_name() == Some(public_name))
    }
}

/// Entity type → schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a schema. Returns the schema it replaced.
    pub fn register(&mut self, schema: EntitySchema) -> Option<EntitySchema> {
        self.schemas.insert(schema.entity_type.clone(), schema)
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl FromIterator<EntitySchema> for SchemaRegistry {
    fn from_iter<T: IntoIterator<Item = EntitySchema>>(iter: T) -> Self {
        let mut registry = Self::new();
        for schema in iter {
            registry.register(schema);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member_schema() -> EntitySchema {
        EntitySchema::new("member")
            .fields(["username", "id", "email"])
            .field(FieldDef::hidden("password"))
            .field(FieldDef::aliased("_phone", "phone"))
            .field(FieldDef::new("_internal_note"))
    }

    #[test]
    fn public_fields_are_sorted_and_resolved() {
        assert_eq!(
            member_schema().public_fields(),
            vec!["email", "id", "phone", "username"]
        );
    }

    #[test]
    fn declares_checks_public_names_only() {
        let schema = member_schema();
        assert!(schema.declares("phone"));
        assert!(!schema.declares("_phone"));
        assert!(!schema.declares("password"));
    }

    #[test]
    fn hierarchy_lists_types_up_to_rank() {
        let hierarchy = Hierarchy::new("type", [("tourist", 1), ("real", 2)]);
        assert_eq!(hierarchy.types_up_to(1), vec!["tourist"]);
        assert_eq!(hierarchy.types_up_to(2), vec!["real", "tourist"]);
        assert_eq!(hierarchy.rank_of("ghost"), None);
    }

    #[test]
    fn ownership_serializes_with_tag() {
        let json = serde_json::to_value(Ownership::OwnerField("user_id".into())).unwrap();
        assert_eq!(json["kind"], "owner_field");
        assert_eq!(json["field"], "user_id");
    }
}

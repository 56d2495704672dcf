//! Response-time field redaction.
//!
//! Walks a serialized payload and nulls every field whose access level does
//! not cover the record it sits in. Arrays are always descended; an object
//! carrying the identifier key is treated as a record. Nested records are
//! checked against the same access map.

use scopegate_core::models::access::{AccessLevel, FieldAccessMap};
use scopegate_core::models::profile::Profile;
use scopegate_core::models::schema::{EntitySchema, Ownership};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::row_access::RecordView;

/// Identity of a record, captured before any of its fields are nulled.
struct RecordIdentity {
    id: Option<Uuid>,
    owner: Option<Uuid>,
    rank: Option<u8>,
}

pub struct ResponseRedactor<'a> {
    access: &'a FieldAccessMap,
    profile: &'a Profile,
    schema: Option<&'a EntitySchema>,
    identifier_key: &'a str,
}

impl<'a> ResponseRedactor<'a> {
    pub fn new(
        access: &'a FieldAccessMap,
        profile: &'a Profile,
        schema: Option<&'a EntitySchema>,
    ) -> Self {
        Self {
            access,
            profile,
            schema,
            identifier_key: "id",
        }
    }

    pub fn with_identifier_key(mut self, identifier_key: &'a str) -> Self {
        self.identifier_key = identifier_key;
        self
    }

    /// Redact `payload` in place. Unknown shapes pass through untouched.
    pub fn redact(&self, payload: &mut Value) {
        match payload {
            Value::Array(items) => {
                for item in items {
                    self.redact(item);
                }
            }
            Value::Object(map) => {
                if map.contains_key(self.identifier_key) {
                    self.redact_record(map);
                }
                for value in map.values_mut() {
                    self.redact(value);
                }
            }
            _ => {}
        }
    }

    fn redact_record(&self, record: &mut Map<String, Value>) {
        let identity = self.identity(record);

        for (field, value) in record.iter_mut() {
            let Some(&level) = self.access.get(field) else {
                continue;
            };
            if !self.keeps(level, &identity) {
                debug!(field = %field, %level, "redacted field");
                *value = Value::Null;
            }
        }
    }

    fn identity(&self, record: &Map<String, Value>) -> RecordIdentity {
        let owner = match self.schema.map(|s| &s.ownership) {
            Some(Ownership::OwnerField(field)) => record.field_uuid(field),
            _ => None,
        };
        let rank = self
            .schema
            .and_then(|s| s.hierarchy.as_ref())
            .and_then(|h| record.field_text(&h.type_field).and_then(|t| h.rank_of(&t)));
        RecordIdentity {
            id: record.field_uuid(self.identifier_key),
            owner,
            rank,
        }
    }

    fn keeps(&self, level: AccessLevel, record: &RecordIdentity) -> bool {
        match level {
            AccessLevel::All => true,
            AccessLevel::Own => self.owns(record),
            AccessLevel::ProfileHierarchy => self.owns(record) || self.outranks(record),
            AccessLevel::None => false,
        }
    }

    fn owns(&self, record: &RecordIdentity) -> bool {
        let me = Some(self.profile.id);
        record.id == me || record.owner == me
    }

    /// Record rank is at most the requester's. An unranked record or
    /// requester never qualifies.
    fn outranks(&self, record: &RecordIdentity) -> bool {
        let requester = self
            .schema
            .and_then(|s| s.hierarchy.as_ref())
            .and_then(|h| h.rank_of(&self.profile.profile_type));
        matches!((record.rank, requester), (Some(r), Some(p)) if r <= p)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use scopegate_core::models::schema::Hierarchy;
    use serde_json::json;

    use super::*;

    fn member_schema() -> EntitySchema {
        EntitySchema::new("member")
            .fields(["id", "username", "type", "phone"])
            .with_hierarchy(Hierarchy::new("type", [("tourist", 1), ("real", 2)]))
            .owned_by(Ownership::SelfReferencing)
    }

    fn access() -> FieldAccessMap {
        FieldAccessMap::from([
            ("id".into(), AccessLevel::ProfileHierarchy),
            ("username".into(), AccessLevel::ProfileHierarchy),
            ("phone".into(), AccessLevel::Own),
        ])
    }

    #[test]
    fn other_records_lose_own_fields() {
        let me = Profile::member("me").with_type("real");
        let schema = member_schema();
        let access = access();
        let other = Uuid::new_v4();
        let mut payload = json!([
            {"id": me.id, "username": "me", "type": "real", "phone": "0911"},
            {"id": other, "username": "other", "type": "tourist", "phone": "0922"},
        ]);

        ResponseRedactor::new(&access, &me, Some(&schema)).redact(&mut payload);

        assert_eq!(
            payload,
            json!([
                {"id": me.id, "username": "me", "type": "real", "phone": "0911"},
                {"id": other, "username": "other", "type": "tourist", "phone": null},
            ])
        );
    }

    #[test]
    fn higher_ranked_records_lose_hierarchy_fields() {
        let me = Profile::member("me").with_type("tourist");
        let schema = member_schema();
        let access = access();
        let other = Uuid::new_v4();
        let mut payload = json!({"id": other, "username": "boss", "type": "real", "phone": "1"});

        ResponseRedactor::new(&access, &me, Some(&schema)).redact(&mut payload);

        // The identifier itself is nulled, yet the phone check still saw it.
        assert_eq!(
            payload,
            json!({"id": null, "username": null, "type": "real", "phone": null})
        );
    }

    #[test]
    fn nested_records_are_redacted() {
        let me = Profile::member("me").with_type("real");
        let schema = member_schema();
        let access = access();
        let mut payload = json!({
            "results": [{"id": Uuid::new_v4(), "type": "tourist", "phone": "x",
                         "referrer": {"id": Uuid::new_v4(), "type": "real", "phone": "y"}}],
            "count": 1,
        });

        ResponseRedactor::new(&access, &me, Some(&schema)).redact(&mut payload);

        assert_eq!(payload["results"][0]["phone"], Value::Null);
        assert_eq!(payload["results"][0]["referrer"]["phone"], Value::Null);
        assert_eq!(payload["count"], 1);
    }

    #[test]
    fn scalars_and_non_records_pass_through() {
        let me = Profile::member("me");
        let access = access();
        let mut payload = json!({"phone": "x", "meta": [1, "two", null]});
        let before = payload.clone();

        ResponseRedactor::new(&access, &me, None).redact(&mut payload);
        assert_eq!(payload, before);
    }
}

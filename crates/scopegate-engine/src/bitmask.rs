//! Compact per-field access encoding.
//!
//! Every public field of an entity type gets a stable bit position
//! (alphabetical order). A mask stores each field's [`AccessLevel`] in the
//! two bits at `position * 2`.

use std::collections::BTreeMap;

use scopegate_core::cache::{CacheBackend, CacheValue};
use scopegate_core::catalog::CatalogReader;
use scopegate_core::error::{ScopegateResult, ValidationError};
use scopegate_core::models::access::{AccessLevel, FieldAccessMap};
use scopegate_core::models::schema::EntitySchema;
use tracing::{debug, info};

use crate::store::CacheStore;

/// A `u128` holds two bits for each of this many fields.
pub const MAX_MASK_FIELDS: usize = 64;

/// Field name → bit position.
pub type FieldBitMap = BTreeMap<String, u32>;

/// Bit positions for the public fields of `schema`.
pub fn bit_map_for(schema: &EntitySchema) -> ScopegateResult<FieldBitMap> {
    let fields = schema.public_fields();
    if fields.len() > MAX_MASK_FIELDS {
        return Err(ValidationError::TooManyFields {
            entity_type: schema.entity_type.clone(),
            count: fields.len(),
            max: MAX_MASK_FIELDS,
        }
        .into());
    }
    Ok(fields.into_iter().zip(0u32..).collect())
}

/// Pack `levels` into a mask. Fields missing from `bit_map` are ignored.
pub fn pack(bit_map: &FieldBitMap, levels: &FieldAccessMap) -> u128 {
    levels.iter().fold(0u128, |mask, (field, level)| {
        match bit_map.get(field) {
            Some(&pos) => mask | (u128::from(level.bits()) << (pos * 2)),
            None => mask,
        }
    })
}

/// Level of the field at `pos`.
pub fn level_at(mask: u128, pos: u32) -> AccessLevel {
    AccessLevel::from_bits(((mask >> (pos * 2)) & 0b11) as u8)
}

/// Every field with a level above [`AccessLevel::None`].
pub fn unpack(bit_map: &FieldBitMap, mask: u128) -> FieldAccessMap {
    bit_map
        .iter()
        .filter_map(|(field, &pos)| {
            let level = level_at(mask, pos);
            (level > AccessLevel::None).then(|| (field.clone(), level))
        })
        .collect()
}

pub struct FieldBitmaskCodec<'a, S: ?Sized, C> {
    catalog: &'a S,
    store: &'a CacheStore<C>,
}

impl<'a, S, C> FieldBitmaskCodec<'a, S, C>
where
    S: CatalogReader + ?Sized,
    C: CacheBackend,
{
    pub fn new(catalog: &'a S, store: &'a CacheStore<C>) -> Self {
        Self { catalog, store }
    }

    fn compute(&self, entity_type: &str) -> ScopegateResult<FieldBitMap> {
        match self.catalog.entity_schema(entity_type)? {
            Some(schema) => bit_map_for(&schema),
            None => {
                debug!(entity_type, "no schema registered, empty field bit map");
                Ok(FieldBitMap::new())
            }
        }
    }

    /// Cached bit map of `entity_type`.
    pub fn get_field_bit_map(&self, entity_type: &str) -> ScopegateResult<FieldBitMap> {
        let key = self.store.keys().bit_map(entity_type);
        if let Some(map) = self.store.bit_map(&key) {
            return Ok(map);
        }
        let map = self.compute(entity_type)?;
        self.store.set(&key, CacheValue::BitMap(map.clone()));
        Ok(map)
    }

    pub fn encode(&self, entity_type: &str, levels: &FieldAccessMap) -> ScopegateResult<u128> {
        Ok(pack(&self.get_field_bit_map(entity_type)?, levels))
    }

    /// Fields granted at any level.
    pub fn decode_fields(&self, entity_type: &str, mask: u128) -> ScopegateResult<Vec<String>> {
        Ok(self
            .decode_fields_with_level(entity_type, mask)?
            .into_keys()
            .collect())
    }

    pub fn decode_fields_with_level(
        &self,
        entity_type: &str,
        mask: u128,
    ) -> ScopegateResult<FieldAccessMap> {
        Ok(unpack(&self.get_field_bit_map(entity_type)?, mask))
    }

    /// Level of one field, [`AccessLevel::None`] for an unknown field.
    pub fn field_level(&self, entity_type: &str, mask: u128, field: &str) -> ScopegateResult<AccessLevel> {
        Ok(self
            .get_field_bit_map(entity_type)?
            .get(field)
            .map_or(AccessLevel::None, |&pos| level_at(mask, pos)))
    }

    /// Recompute the bit map of `entity_type`. When it differs from the
    /// cached one, every access mask built against the old positions is
    /// dropped. Returns whether the map changed.
    pub fn update_field_map(&self, entity_type: &str) -> ScopegateResult<bool> {
        let key = self.store.keys().bit_map(entity_type);
        let current = self.compute(entity_type)?;
        let changed = self.store.bit_map(&key).as_ref() != Some(&current);

        if changed {
            self.store.set(&key, CacheValue::BitMap(current));
            let profile_ids = self.catalog.profile_ids(None)?;
            self.store.purge_access(&profile_ids, entity_type);
            info!(entity_type, "field bit map changed, purged access masks");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use scopegate_core::cache::CacheKeys;
    use scopegate_core::models::schema::FieldDef;

    use super::*;
    use crate::memory::InMemoryCache;
    use crate::snapshot::CatalogSnapshot;

    fn member_schema() -> EntitySchema {
        EntitySchema::new("member")
            .fields(["username", "id", "email"])
            .field(FieldDef::hidden("password"))
            .field(FieldDef::aliased("_phone", "phone"))
            .field(FieldDef::new("_secret"))
    }

    #[test]
    fn positions_are_alphabetical_over_public_fields() {
        let map = bit_map_for(&member_schema()).unwrap();
        let order: Vec<(&str, u32)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            order,
            vec![("email", 0), ("id", 1), ("phone", 2), ("username", 3)]
        );
    }

    #[test]
    fn schema_over_capacity_is_rejected() {
        let schema = EntitySchema::new("wide").fields((0..65).map(|i| format!("f{i:02}")));
        assert!(bit_map_for(&schema).is_err());
        let schema = EntitySchema::new("full").fields((0..64).map(|i| format!("f{i:02}")));
        assert_eq!(bit_map_for(&schema).unwrap().len(), 64);
    }

    #[test]
    fn pack_writes_two_bits_per_field() {
        let map = bit_map_for(&member_schema()).unwrap();
        let levels = FieldAccessMap::from([
            ("email".into(), AccessLevel::ProfileHierarchy),
            ("phone".into(), AccessLevel::Own),
            ("salary".into(), AccessLevel::All),
        ]);
        let mask = pack(&map, &levels);
        assert_eq!(mask, 0b01_00_10);
        assert_eq!(level_at(mask, 2), AccessLevel::Own);
        assert_eq!(unpack(&map, mask).len(), 2);
    }

    #[test]
    fn field_map_updates_purge_access_masks() {
        let mut c = CatalogSnapshot::default();
        c.register_schema(member_schema());
        let profile = scopegate_core::models::profile::Profile::member("m");
        c.profiles.insert(profile.id, profile.clone());

        let cache = Arc::new(InMemoryCache::new());
        let store = CacheStore::new(cache.clone(), CacheKeys::default(), None);
        let codec = FieldBitmaskCodec::new(&c, &store);

        codec.get_field_bit_map("member").unwrap();
        let access_key = store.keys().access(profile.id, "member");
        store.set(&access_key, CacheValue::Masks(Default::default()));

        assert!(!codec.update_field_map("member").unwrap());
        assert!(cache.contains_key(&access_key));

        c.register_schema(member_schema().fields(["full_name"]));
        let codec = FieldBitmaskCodec::new(&c, &store);
        assert!(codec.update_field_map("member").unwrap());
        assert!(!cache.contains_key(&access_key));
        assert_eq!(codec.field_level("member", 0b11 << 2, "full_name").unwrap(), AccessLevel::All);
    }

    fn level() -> impl Strategy<Value = AccessLevel> {
        prop_oneof![
            Just(AccessLevel::None),
            Just(AccessLevel::Own),
            Just(AccessLevel::ProfileHierarchy),
            Just(AccessLevel::All),
        ]
    }

    proptest! {
        #[test]
        fn pack_then_unpack_preserves_granted_levels(
            levels in proptest::collection::btree_map("f[0-9]{2}", level(), 0..64)
        ) {
            let schema = EntitySchema::new("wide").fields((0..100).map(|i| format!("f{i:02}")).take(64));
            let map = bit_map_for(&schema).unwrap();
            let levels: FieldAccessMap = levels
                .into_iter()
                .filter(|(f, _)| map.contains_key(f))
                .collect();

            let decoded = unpack(&map, pack(&map, &levels));
            let expected: FieldAccessMap = levels
                .into_iter()
                .filter(|(_, l)| *l > AccessLevel::None)
                .collect();
            prop_assert_eq!(decoded, expected);
        }
    }
}

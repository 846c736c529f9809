//! Identity tables: the ephemeral copy-time map and the collision-checked GUID map

use std::collections::HashMap;

use super::guid::{self, ExternalGuid, IdSpace};
use crate::error::{Result, SyncError};

/// Source id -> freshly minted id, alive for a single copy operation
#[derive(Debug, Default)]
pub struct IdMap {
    map: HashMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new id for `source_id`, or return the one already minted
    pub fn mint(&mut self, source_id: &str, space: IdSpace) -> String {
        self.map
            .entry(source_id.to_string())
            .or_insert_with(|| guid::mint(space))
            .clone()
    }

    /// Mint an id for an entity with no source counterpart (e.g. an inherited copy)
    pub fn mint_detached(&self, space: IdSpace) -> String {
        guid::mint(space)
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.map.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.map.contains_key(source_id)
    }

    /// The copied id when `source_id` is inside the copy, otherwise the id unchanged
    pub fn resolve(&self, source_id: &str) -> String {
        match self.map.get(source_id) {
            Some(new_id) => new_id.clone(),
            None => source_id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A registered GUID and the internal id it was mapped from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEntry {
    pub guid: ExternalGuid,
    pub space: IdSpace,
    pub internal_id: String,
}

/// GUID -> space table that rejects a GUID being used in both spaces
#[derive(Debug, Default)]
pub struct IdentityMap {
    spaces: HashMap<ExternalGuid, IdSpace>,
    pending: Vec<IdentityEntry>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from previously persisted mappings
    pub fn from_entries(entries: impl IntoIterator<Item = IdentityEntry>) -> Self {
        let mut map = Self::new();
        for entry in entries {
            map.spaces.insert(entry.guid, entry.space);
        }
        map
    }

    /// Translate an internal id, recording its space and rejecting collisions
    pub fn map(&mut self, internal_id: &str) -> Result<ExternalGuid> {
        let (space, guid) = guid::to_external(internal_id)?;
        self.claim(&guid, space, internal_id)?;
        Ok(guid)
    }

    fn claim(&mut self, guid: &ExternalGuid, space: IdSpace, internal_id: &str) -> Result<()> {
        match self.spaces.get(guid) {
            Some(existing) if *existing != space => Err(SyncError::IdentityCollision {
                guid: guid.to_string(),
                existing: existing.to_string(),
                requested: space.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.spaces.insert(guid.clone(), space);
                self.pending.push(IdentityEntry {
                    guid: guid.clone(),
                    space,
                    internal_id: internal_id.to_string(),
                });
                Ok(())
            }
        }
    }

    pub fn space_of(&self, guid: &ExternalGuid) -> Option<IdSpace> {
        self.spaces.get(guid).copied()
    }

    /// Mappings first seen since the map was created or last drained
    pub fn drain_pending(&mut self) -> Vec<IdentityEntry> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJ: &str = "EAID_0A1B2C3D_0000_4E5F_8899_AABBCCDDEEFF";
    const PKG: &str = "EAPK_0A1B2C3D_0000_4E5F_8899_AABBCCDDEEFF";

    #[test]
    fn test_mint_is_stable_per_source_id() {
        let mut ids = IdMap::new();

        let first = ids.mint("c1", IdSpace::Object);
        let again = ids.mint("c1", IdSpace::Object);

        assert_eq!(first, again);
        assert_ne!(first, "c1");
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_resolve_preserves_outside_ids() {
        let mut ids = IdMap::new();
        let copied = ids.mint("inside", IdSpace::Object);

        assert_eq!(ids.resolve("inside"), copied);
        assert_eq!(ids.resolve("outside"), "outside");
    }

    #[test]
    fn test_same_guid_in_both_spaces_collides() {
        let mut map = IdentityMap::new();
        map.map(OBJ).unwrap();

        let err = map.map(PKG).unwrap_err();

        assert!(matches!(err, SyncError::IdentityCollision { .. }));
    }

    #[test]
    fn test_repeat_mapping_is_not_pending_twice() {
        let mut map = IdentityMap::new();
        map.map(OBJ).unwrap();
        map.map(OBJ).unwrap();

        assert_eq!(map.drain_pending().len(), 1);
        assert!(map.drain_pending().is_empty());
    }

    #[test]
    fn test_seeded_entries_are_enforced() {
        let (space, guid) = guid::to_external(PKG).unwrap();
        let mut map = IdentityMap::from_entries([IdentityEntry {
            guid,
            space,
            internal_id: PKG.to_string(),
        }]);

        assert!(map.map(OBJ).is_err());
        assert!(map.map(PKG).is_ok());
    }
}

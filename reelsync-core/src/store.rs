//! Entity storage.
//!
//! # Contract
//!
//! [`EntityStore`] is the seam between the sync engine and whatever holds the
//! data. Every method is fallible so a remote-backed implementation can report
//! transport trouble as [`StoreError::Unavailable`]; [`MemoryStore`] only ever
//! fails with [`StoreError::NotFound`].
//!
//! # Unique-key index
//!
//! Each type keeps a secondary index `unique key -> ids`, where the key is the
//! entity's `name` (or `code` when there is no name). The ids under one key
//! are kept in write order: every write drops the entity from its previous
//! key and pushes it on top of its new key, and a lookup returns the top.
//! Removing the top holder (by delete, or by moving it to another key) makes
//! the previous holder visible again instead of orphaning the key.
//!
//! `MemoryStore` is not internally synchronized. Writers take `&mut self`;
//! callers that share one store across threads must serialize access.

use std::collections::{BTreeMap, HashMap};

use crate::error::StoreError;
use crate::types::{Entity, EntityId, EntityType, FieldMap};

// ---------------------------------------------------------------------------
// 1. Contract
// ---------------------------------------------------------------------------

/// Keyed storage for entities of arbitrary types.
pub trait EntityStore {
    /// Insert `entity` under `entity_type`, replacing any entity with the same
    /// id. The stored entity's type is forced to `entity_type`.
    fn add(&mut self, entity_type: &EntityType, entity: Entity) -> Result<Entity, StoreError>;

    fn get(&self, entity_type: &EntityType, id: EntityId) -> Result<Option<Entity>, StoreError>;

    /// Look up an entity by its `name` / `code`. When several entities share
    /// the key, the most recently written one wins.
    fn get_by_unique_key(
        &self,
        entity_type: &EntityType,
        key: &str,
    ) -> Result<Option<Entity>, StoreError>;

    /// Merge `partial` into the stored entity. Fails with
    /// [`StoreError::NotFound`] if `id` is absent.
    fn update(
        &mut self,
        entity_type: &EntityType,
        id: EntityId,
        partial: FieldMap,
    ) -> Result<Entity, StoreError>;

    /// Remove and return the stored entity. Fails with
    /// [`StoreError::NotFound`] if `id` is absent.
    fn delete(&mut self, entity_type: &EntityType, id: EntityId) -> Result<Entity, StoreError>;

    /// The id the next created entity of this type should receive.
    fn next_id(&self, entity_type: &EntityType) -> Result<EntityId, StoreError>;

    /// All entities of a type, ascending by id.
    fn list(&self, entity_type: &EntityType) -> Result<Vec<Entity>, StoreError>;

    fn count(&self, entity_type: &EntityType) -> Result<usize, StoreError> {
        Ok(self.list(entity_type)?.len())
    }
}

// ---------------------------------------------------------------------------
// 2. In-memory implementation
// ---------------------------------------------------------------------------

/// Map-backed [`EntityStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: HashMap<EntityType, BTreeMap<EntityId, Entity>>,
    indices: HashMap<EntityType, HashMap<String, Vec<EntityId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity types that currently hold at least one entity, sorted.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self
            .entities
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    fn unindex(&mut self, entity_type: &EntityType, key: Option<String>, id: EntityId) {
        let Some(key) = key else { return };
        let Some(index) = self.indices.get_mut(entity_type) else { return };
        if let Some(holders) = index.get_mut(&key) {
            holders.retain(|held| *held != id);
            if holders.is_empty() {
                index.remove(&key);
            }
        }
    }

    fn index(&mut self, entity_type: &EntityType, key: Option<String>, id: EntityId) {
        let Some(key) = key else { return };
        let holders = self
            .indices
            .entry(entity_type.clone())
            .or_default()
            .entry(key)
            .or_default();
        holders.retain(|held| *held != id);
        holders.push(id);
    }
}

impl EntityStore for MemoryStore {
    fn add(&mut self, entity_type: &EntityType, mut entity: Entity) -> Result<Entity, StoreError> {
        entity.entity_type = entity_type.clone();
        let id = entity.id;
        let key = entity.unique_key();

        let previous = self
            .entities
            .entry(entity_type.clone())
            .or_default()
            .insert(id, entity.clone());
        if let Some(previous) = previous {
            self.unindex(entity_type, previous.unique_key(), id);
        }
        self.index(entity_type, key, id);
        Ok(entity)
    }

    fn get(&self, entity_type: &EntityType, id: EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self
            .entities
            .get(entity_type)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    fn get_by_unique_key(
        &self,
        entity_type: &EntityType,
        key: &str,
    ) -> Result<Option<Entity>, StoreError> {
        let Some(id) = self
            .indices
            .get(entity_type)
            .and_then(|index| index.get(key))
            .and_then(|holders| holders.last())
        else {
            return Ok(None);
        };
        self.get(entity_type, *id)
    }

    fn update(
        &mut self,
        entity_type: &EntityType,
        id: EntityId,
        partial: FieldMap,
    ) -> Result<Entity, StoreError> {
        let entity = self
            .entities
            .get_mut(entity_type)
            .and_then(|table| table.get_mut(&id))
            .ok_or_else(|| StoreError::not_found(entity_type.as_str(), id))?;

        let old_key = entity.unique_key();
        entity.merge(partial);
        let updated = entity.clone();

        self.unindex(entity_type, old_key, id);
        self.index(entity_type, updated.unique_key(), id);
        Ok(updated)
    }

    fn delete(&mut self, entity_type: &EntityType, id: EntityId) -> Result<Entity, StoreError> {
        let removed = self
            .entities
            .get_mut(entity_type)
            .and_then(|table| table.remove(&id))
            .ok_or_else(|| StoreError::not_found(entity_type.as_str(), id))?;
        self.unindex(entity_type, removed.unique_key(), id);
        Ok(removed)
    }

    fn next_id(&self, entity_type: &EntityType) -> Result<EntityId, StoreError> {
        // max + 1 rather than len + 1: the two agree until something is
        // deleted, and only max + 1 stays unique afterwards.
        let last = self
            .entities
            .get(entity_type)
            .and_then(|table| table.keys().next_back().copied())
            .unwrap_or(0);
        Ok(last + 1)
    }

    fn list(&self, entity_type: &EntityType) -> Result<Vec<Entity>, StoreError> {
        Ok(self
            .entities
            .get(entity_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self, entity_type: &EntityType) -> Result<usize, StoreError> {
        Ok(self.entities.get(entity_type).map_or(0, BTreeMap::len))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

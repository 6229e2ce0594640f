//! Chunked bulk create / update / delete with per-chunk rollback.
//!
//! ## Chunk protocol
//!
//! 1. Split the input into chunks of `batch_size` items.
//! 2. Run each chunk as one unit inside [`RetryExecutor::execute`].
//! 3. Every store write appends its inverse to an [`UndoLog`]. Before the
//!    first write that touches a unique key, the log also remembers which
//!    other entity the key resolved to, so rollback can hand it back.
//! 4. If a write fails, replay the log in reverse, then return the error
//!    so the executor can retry the whole chunk from scratch.
//! 5. On success the log is dropped and the chunk stays committed.
//!
//! Atomicity is per chunk. When chunk `k` fails for good, chunks `1..k`
//! remain in the store; re-submitting the whole call may therefore
//! duplicate creates that already landed.

use std::collections::HashSet;

use reelsync_core::{Entity, EntityId, EntityStore, EntityType, FieldMap, StoreError};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::retry::{RetryExecutor, Sleep};

// ---------------------------------------------------------------------------
// Undo log
// ---------------------------------------------------------------------------

/// The inverse of one store write.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// Undo a create by deleting the new entity.
    Remove { id: EntityId },
    /// Undo an update or delete by writing back the captured entity.
    Restore(Entity),
    /// Rewrite an untouched entity so its unique key resolves to it again.
    Reindex(Entity),
}

/// Reversible actions recorded while a chunk runs.
#[derive(Debug)]
pub struct UndoLog {
    entity_type: EntityType,
    actions: Vec<UndoAction>,
    /// Unique keys whose pre-chunk holder has already been captured.
    guarded: HashSet<String>,
}

impl UndoLog {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            actions: Vec::new(),
            guarded: HashSet::new(),
        }
    }

    /// Call before `writer` is written in a way that touches `key`.
    ///
    /// The first time a key is seen, the entity it currently resolves to is
    /// captured as an [`UndoAction::Reindex`] unless that entity is `writer`
    /// itself (its own `Restore` / `Remove` already puts the key back).
    pub fn guard_key<S>(
        &mut self,
        store: &S,
        key: Option<String>,
        writer: EntityId,
    ) -> Result<(), SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let Some(key) = key else { return Ok(()) };
        if !self.guarded.insert(key.clone()) {
            return Ok(());
        }
        if let Some(holder) = store.get_by_unique_key(&self.entity_type, &key)? {
            if holder.id != writer {
                self.actions.push(UndoAction::Reindex(holder));
            }
        }
        Ok(())
    }

    pub fn record(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Replay every action, newest first, and hand back the error to surface.
    ///
    /// Returns `cause` unchanged when the store is back at its pre-chunk
    /// state. If any undo step fails the store is in an unknown state and
    /// the result is a non-retryable [`SyncError::Rollback`].
    pub fn rollback<S>(self, store: &mut S, cause: SyncError) -> SyncError
    where
        S: EntityStore + ?Sized,
    {
        let steps = self.actions.len();
        let mut failed = 0;
        for action in self.actions.into_iter().rev() {
            let outcome = match action {
                UndoAction::Remove { id } => store.delete(&self.entity_type, id).map(|_| ()),
                UndoAction::Restore(entity) | UndoAction::Reindex(entity) => {
                    store.add(&self.entity_type, entity).map(|_| ())
                }
            };
            if let Err(err) = outcome {
                tracing::error!("bulk.rollback_step_failed type={} error={err}", self.entity_type);
                failed += 1;
            }
        }

        if failed == 0 {
            if steps > 0 {
                tracing::warn!(
                    "bulk.rollback type={} undone={steps} cause={cause}",
                    self.entity_type
                );
            }
            return cause;
        }
        SyncError::Rollback {
            entity_type: self.entity_type.to_string(),
            failed,
            cause: Box::new(cause),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Applies bulk operations to a store chunk by chunk.
#[derive(Debug)]
pub struct BulkCoordinator {
    batch_size: usize,
    executor: RetryExecutor,
}

impl BulkCoordinator {
    /// Build from a validated config.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            batch_size: config.batch_size,
            executor: RetryExecutor::new(config.retry.clone()),
        })
    }

    /// Replace the executor's sleep strategy.
    pub fn with_sleep(mut self, sleeper: impl Sleep + Send + Sync + 'static) -> Self {
        self.executor = self.executor.with_sleep(sleeper);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Create one entity per payload. Ids are assigned contiguously from
    /// `next_id` at the start of each chunk; `id` / `type` keys in a payload
    /// are ignored. Returns the created entities in input order.
    pub fn create<S>(
        &self,
        store: &mut S,
        entity_type: &EntityType,
        payloads: Vec<FieldMap>,
    ) -> Result<Vec<Entity>, SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let total = payloads.len();
        let chunks = self.chunk_count(total);
        let mut created = Vec::with_capacity(total);

        for (index, chunk) in payloads.chunks(self.batch_size).enumerate() {
            let operation = chunk_name("bulk_create", entity_type, index, chunks);
            let entities = self.run_chunk(store, entity_type, &operation, |store, log| {
                let first = store.next_id(entity_type)?;
                let mut out = Vec::with_capacity(chunk.len());
                for (id, fields) in (first..).zip(chunk) {
                    let entity = Entity::new(id, entity_type.clone(), fields.clone());
                    log.guard_key(&*store, entity.unique_key(), id)?;
                    out.push(store.add(entity_type, entity)?);
                    log.record(UndoAction::Remove { id });
                }
                Ok(out)
            })?;
            tracing::debug!("{operation} committed={}", entities.len());
            created.extend(entities);
        }

        tracing::info!("bulk_create type={entity_type} created={total} chunks={chunks}");
        Ok(created)
    }

    /// Create a single entity (a one-item batch).
    pub fn create_one<S>(
        &self,
        store: &mut S,
        entity_type: &EntityType,
        fields: FieldMap,
    ) -> Result<Entity, SyncError>
    where
        S: EntityStore + ?Sized,
    {
        self.create(store, entity_type, vec![fields])?
            .pop()
            .ok_or_else(|| StoreError::unavailable("create returned no entity").into())
    }

    /// Merge each payload into the entity named by its `id` key.
    ///
    /// Every payload must carry an integer `id`; this is checked for the
    /// whole call before any chunk runs and fails with
    /// [`SyncError::Validation`] (never retried).
    pub fn update<S>(
        &self,
        store: &mut S,
        entity_type: &EntityType,
        updates: Vec<FieldMap>,
    ) -> Result<Vec<Entity>, SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let targets = split_update_ids(updates)?;
        let total = targets.len();
        let chunks = self.chunk_count(total);
        let mut updated = Vec::with_capacity(total);

        for (index, chunk) in targets.chunks(self.batch_size).enumerate() {
            let operation = chunk_name("bulk_update", entity_type, index, chunks);
            let entities = self.run_chunk(store, entity_type, &operation, |store, log| {
                let mut out = Vec::with_capacity(chunk.len());
                for (id, partial) in chunk {
                    let original = store
                        .get(entity_type, *id)?
                        .ok_or_else(|| StoreError::not_found(entity_type.as_str(), *id))?;
                    let mut merged = original.clone();
                    merged.merge(partial.clone());
                    log.guard_key(&*store, original.unique_key(), *id)?;
                    log.guard_key(&*store, merged.unique_key(), *id)?;
                    out.push(store.update(entity_type, *id, partial.clone())?);
                    log.record(UndoAction::Restore(original));
                }
                Ok(out)
            })?;
            tracing::debug!("{operation} committed={}", entities.len());
            updated.extend(entities);
        }

        tracing::info!("bulk_update type={entity_type} updated={total} chunks={chunks}");
        Ok(updated)
    }

    /// Delete every id. Returns the removed entities in input order.
    pub fn delete<S>(
        &self,
        store: &mut S,
        entity_type: &EntityType,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>, SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let chunks = self.chunk_count(ids.len());
        let mut removed = Vec::with_capacity(ids.len());

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            let operation = chunk_name("bulk_delete", entity_type, index, chunks);
            let entities = self.run_chunk(store, entity_type, &operation, |store, log| {
                let mut out = Vec::with_capacity(chunk.len());
                for id in chunk {
                    if let Some(current) = store.get(entity_type, *id)? {
                        log.guard_key(&*store, current.unique_key(), *id)?;
                    }
                    let entity = store.delete(entity_type, *id)?;
                    log.record(UndoAction::Restore(entity.clone()));
                    out.push(entity);
                }
                Ok(out)
            })?;
            tracing::debug!("{operation} committed={}", entities.len());
            removed.extend(entities);
        }

        tracing::info!(
            "bulk_delete type={entity_type} deleted={} chunks={chunks}",
            removed.len()
        );
        Ok(removed)
    }

    /// Run one chunk body under the retry executor with a fresh undo log
    /// per attempt.
    fn run_chunk<S, T, F>(
        &self,
        store: &mut S,
        entity_type: &EntityType,
        operation: &str,
        mut body: F,
    ) -> Result<Vec<T>, SyncError>
    where
        S: EntityStore + ?Sized,
        F: FnMut(&mut S, &mut UndoLog) -> Result<Vec<T>, SyncError>,
    {
        self.executor.execute(operation, || {
            let mut log = UndoLog::new(entity_type.clone());
            match body(&mut *store, &mut log) {
                Ok(out) => Ok(out),
                Err(err) => Err(log.rollback(&mut *store, err)),
            }
        })
    }

    fn chunk_count(&self, total: usize) -> usize {
        total.div_ceil(self.batch_size)
    }
}

impl Default for BulkCoordinator {
    fn default() -> Self {
        let config = SyncConfig::default();
        Self {
            batch_size: config.batch_size,
            executor: RetryExecutor::new(config.retry),
        }
    }
}

fn chunk_name(verb: &str, entity_type: &EntityType, index: usize, chunks: usize) -> String {
    format!("{verb}[{entity_type} chunk {}/{chunks}]", index + 1)
}

/// Pull the integer `id` out of every update payload.
fn split_update_ids(updates: Vec<FieldMap>) -> Result<Vec<(EntityId, FieldMap)>, SyncError> {
    updates
        .into_iter()
        .enumerate()
        .map(|(index, mut partial)| {
            let id = partial
                .remove("id")
                .as_ref()
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| {
                    SyncError::Validation(format!(
                        "update payload {index} must contain an integer 'id' field"
                    ))
                })?;
            Ok((id, partial))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use reelsync_core::MemoryStore;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Wraps a [`MemoryStore`] and fails selected `add` calls.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        adds: usize,
        /// 1-based `add` call numbers that fail.
        fail_adds: Vec<usize>,
        /// `add` calls carrying this code always fail.
        poison_code: Option<String>,
    }

    impl EntityStore for FlakyStore {
        fn add(&mut self, t: &EntityType, entity: Entity) -> Result<Entity, StoreError> {
            self.adds += 1;
            let poisoned = self.poison_code.is_some()
                && entity.str_field("code") == self.poison_code.as_deref();
            if poisoned || self.fail_adds.contains(&self.adds) {
                return Err(StoreError::unavailable(format!("add #{} refused", self.adds)));
            }
            self.inner.add(t, entity)
        }
        fn get(&self, t: &EntityType, id: EntityId) -> Result<Option<Entity>, StoreError> {
            self.inner.get(t, id)
        }
        fn get_by_unique_key(&self, t: &EntityType, key: &str) -> Result<Option<Entity>, StoreError> {
            self.inner.get_by_unique_key(t, key)
        }
        fn update(&mut self, t: &EntityType, id: EntityId, p: FieldMap) -> Result<Entity, StoreError> {
            self.inner.update(t, id, p)
        }
        fn delete(&mut self, t: &EntityType, id: EntityId) -> Result<Entity, StoreError> {
            self.inner.delete(t, id)
        }
        fn next_id(&self, t: &EntityType) -> Result<EntityId, StoreError> {
            self.inner.next_id(t)
        }
        fn list(&self, t: &EntityType) -> Result<Vec<Entity>, StoreError> {
            self.inner.list(t)
        }
    }

    fn shot() -> EntityType {
        EntityType::new("Shot").unwrap()
    }

    fn coordinator(batch_size: usize) -> BulkCoordinator {
        let config = SyncConfig::new().with_batch_size(batch_size).with_retry(
            RetryPolicy::new(3)
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(Duration::ZERO),
        );
        BulkCoordinator::new(&config)
            .unwrap()
            .with_sleep(|_: Duration| -> Result<(), SyncError> { Ok(()) })
    }

    fn payload(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn codes(n: usize) -> Vec<FieldMap> {
        (1..=n).map(|i| payload(json!({"code": format!("SH{i:03}")}))).collect()
    }

    #[test]
    fn create_assigns_increasing_ids_in_input_order() {
        let mut store = MemoryStore::new();
        let created = coordinator(3).create(&mut store, &shot(), codes(7)).unwrap();

        let ids: Vec<_> = created.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        assert_eq!(created[6].str_field("code"), Some("SH007"));
        assert_eq!(store.count(&shot()).unwrap(), 7);
    }

    #[test]
    fn create_ignores_payload_identity_keys() {
        let mut store = MemoryStore::new();
        let created = coordinator(10)
            .create(&mut store, &shot(), vec![payload(json!({"id": 99, "type": "Asset"}))])
            .unwrap();
        assert_eq!(created[0].id, 1);
        assert_eq!(created[0].entity_type, shot());
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(5);
        assert!(bulk.create(&mut store, &shot(), vec![]).unwrap().is_empty());
        assert!(bulk.update(&mut store, &shot(), vec![]).unwrap().is_empty());
        assert!(bulk.delete(&mut store, &shot(), &[]).unwrap().is_empty());
    }

    #[test]
    fn transient_add_failure_rolls_back_then_retries_chunk() {
        let mut store = FlakyStore {
            fail_adds: vec![2],
            ..FlakyStore::default()
        };
        let created = coordinator(5).create(&mut store, &shot(), codes(3)).unwrap();

        // Attempt 1: add #1 ok, add #2 fails, rollback. Attempt 2: adds #3..#5.
        assert_eq!(store.adds, 5);
        let ids: Vec<_> = created.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.count(&shot()).unwrap(), 3);
    }

    #[test]
    fn failing_chunk_leaves_no_partial_entities() {
        let mut store = FlakyStore {
            poison_code: Some("SH005".into()),
            ..FlakyStore::default()
        };
        let err = coordinator(3)
            .create(&mut store, &shot(), codes(6))
            .unwrap_err();

        assert!(matches!(err, SyncError::Operation { attempts: 3, .. }), "got: {err}");
        // Chunk 1 (SH001..SH003) committed; chunk 2 fully rolled back.
        let kept: Vec<_> = store
            .list(&shot())
            .unwrap()
            .iter()
            .filter_map(|e| e.str_field("code").map(str::to_owned))
            .collect();
        assert_eq!(kept, vec!["SH001", "SH002", "SH003"]);
        assert!(store.get_by_unique_key(&shot(), "SH004").unwrap().is_none());
    }

    #[test]
    fn update_requires_integer_id_up_front() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(1);
        bulk.create(&mut store, &shot(), codes(1)).unwrap();

        let err = bulk
            .update(
                &mut store,
                &shot(),
                vec![
                    payload(json!({"id": 1, "status": "ip"})),
                    payload(json!({"id": "two", "status": "ip"})),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)), "got: {err}");
        assert!(err.to_string().contains("payload 1"));
        // Nothing ran, not even the valid first payload.
        assert!(store.get(&shot(), 1).unwrap().unwrap().get("status").is_none());
    }

    #[test]
    fn failed_update_chunk_restores_originals() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(10);
        bulk.create(&mut store, &shot(), codes(2)).unwrap();

        let err = bulk
            .update(
                &mut store,
                &shot(),
                vec![
                    payload(json!({"id": 1, "code": "RENAMED"})),
                    payload(json!({"id": 2, "status": "ip"})),
                    payload(json!({"id": 42, "status": "ip"})),
                ],
            )
            .unwrap_err();

        assert!(err.is_not_found(), "got: {err}");
        let first = store.get(&shot(), 1).unwrap().unwrap();
        assert_eq!(first.str_field("code"), Some("SH001"));
        assert_eq!(store.get_by_unique_key(&shot(), "SH001").unwrap().unwrap().id, 1);
        assert!(store.get_by_unique_key(&shot(), "RENAMED").unwrap().is_none());
        assert!(store.get(&shot(), 2).unwrap().unwrap().get("status").is_none());
    }

    #[test]
    fn delete_with_missing_id_restores_chunk() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(10);
        bulk.create(&mut store, &shot(), codes(3)).unwrap();

        let err = bulk.delete(&mut store, &shot(), &[1, 9, 3]).unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
        assert_eq!(store.count(&shot()).unwrap(), 3);
        assert_eq!(store.get_by_unique_key(&shot(), "SH001").unwrap().unwrap().id, 1);
    }

    #[test]
    fn rolled_back_create_hands_shared_key_back_to_existing_entity() {
        let mut store = FlakyStore {
            fail_adds: vec![3],
            ..FlakyStore::default()
        };
        let bulk = coordinator(10).with_sleep(|_: Duration| -> Result<(), SyncError> {
            Err(SyncError::Cancelled("stop".into()))
        });
        bulk.create(&mut store, &shot(), vec![payload(json!({"code": "Demo"}))])
            .unwrap();

        // Add #2 reuses "Demo" and lands, add #3 fails and the chunk unwinds.
        let err = bulk
            .create(
                &mut store,
                &shot(),
                vec![payload(json!({"code": "Demo"})), payload(json!({"code": "Other"}))],
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled(_)), "got: {err}");

        assert_eq!(store.count(&shot()).unwrap(), 1);
        assert_eq!(store.get_by_unique_key(&shot(), "Demo").unwrap().unwrap().id, 1);
        assert!(store.get_by_unique_key(&shot(), "Other").unwrap().is_none());
    }

    #[test]
    fn rolled_back_update_hands_colliding_key_back() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(10);
        bulk.create(
            &mut store,
            &shot(),
            vec![payload(json!({"code": "A"})), payload(json!({"code": "B"}))],
        )
        .unwrap();

        let err = bulk
            .update(
                &mut store,
                &shot(),
                vec![
                    payload(json!({"id": 1, "code": "B"})),
                    payload(json!({"id": 99, "status": "ip"})),
                ],
            )
            .unwrap_err();
        assert!(err.is_not_found(), "got: {err}");

        assert_eq!(store.get_by_unique_key(&shot(), "A").unwrap().unwrap().id, 1);
        assert_eq!(store.get_by_unique_key(&shot(), "B").unwrap().unwrap().id, 2);
    }

    #[test]
    fn rolled_back_delete_keeps_the_newest_holder_on_top() {
        let mut store = MemoryStore::new();
        let bulk = coordinator(10);
        bulk.create(
            &mut store,
            &shot(),
            vec![payload(json!({"code": "dup"})), payload(json!({"code": "dup"}))],
        )
        .unwrap();
        assert_eq!(store.get_by_unique_key(&shot(), "dup").unwrap().unwrap().id, 2);

        // Deleting the older holder then failing must not promote it.
        let err = bulk.delete(&mut store, &shot(), &[1, 7]).unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
        assert_eq!(store.count(&shot()).unwrap(), 2);
        assert_eq!(store.get_by_unique_key(&shot(), "dup").unwrap().unwrap().id, 2);
    }

    #[test]
    fn guard_key_captures_each_foreign_holder_once() {
        let mut store = MemoryStore::new();
        let t = shot();
        store.add(&t, Entity::new(1, t.clone(), payload(json!({"code": "K"})))).unwrap();

        let mut log = UndoLog::new(t.clone());
        log.guard_key(&store, Some("K".into()), 2).unwrap();
        log.guard_key(&store, Some("K".into()), 3).unwrap();
        log.guard_key(&store, Some("free".into()), 2).unwrap();
        log.guard_key(&store, None, 2).unwrap();
        assert_eq!(log.len(), 1);

        let mut own = UndoLog::new(t);
        own.guard_key(&store, Some("K".into()), 1).unwrap();
        assert!(own.is_empty());
    }

    #[test]
    fn undo_log_replays_newest_first() {
        let mut store = MemoryStore::new();
        let t = shot();
        let original = Entity::new(1, t.clone(), payload(json!({"code": "A"})));
        store.add(&t, original.clone()).unwrap();

        // Update then delete the same entity; reverse replay must end on the
        // pre-update state.
        let mut log = UndoLog::new(t.clone());
        store.update(&t, 1, payload(json!({"code": "B"}))).unwrap();
        log.record(UndoAction::Restore(original.clone()));
        let updated = store.delete(&t, 1).unwrap();
        log.record(UndoAction::Restore(updated));
        assert_eq!(log.len(), 2);

        let cause = SyncError::Validation("boom".into());
        let surfaced = log.rollback(&mut store, cause);
        assert!(matches!(surfaced, SyncError::Validation(_)));
        assert_eq!(store.get(&t, 1).unwrap(), Some(original));
    }

    #[test]
    fn failed_undo_step_is_reported_as_rollback_error() {
        let mut store = MemoryStore::new();
        let mut log = UndoLog::new(shot());
        log.record(UndoAction::Remove { id: 5 });
        let err = log.rollback(&mut store, SyncError::Store(StoreError::unavailable("x")));
        assert!(matches!(err, SyncError::Rollback { failed: 1, .. }), "got: {err}");
        assert!(!err.is_retryable());
    }
}

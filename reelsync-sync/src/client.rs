//! [`SyncClient`]: the single entry point callers use.
//!
//! The client owns exactly one [`EntityStore`] and one [`BulkCoordinator`];
//! every operation borrows both explicitly. Writers take `&mut self`, so a
//! client is single-writer by construction.

use std::path::Path;

use serde_json::Value;

use reelsync_core::{Entity, EntityId, EntityStore, EntityType, FieldMap, MemoryStore};
use reelsync_template::{HierarchyTemplate, RenderContext};

use crate::bulk::BulkCoordinator;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::hierarchy::{HierarchyEngine, HierarchyResult};
use crate::retry::Sleep;

/// Bulk sync façade over an entity store.
#[derive(Debug)]
pub struct SyncClient<S = MemoryStore> {
    pub(crate) store: S,
    pub(crate) coordinator: BulkCoordinator,
}

impl SyncClient<MemoryStore> {
    /// In-memory client with the default configuration.
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            coordinator: BulkCoordinator::default(),
        }
    }
}

impl Default for SyncClient<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EntityStore> SyncClient<S> {
    /// Client over `store`; fails if `config` does not validate.
    pub fn with_store(store: S, config: &SyncConfig) -> Result<Self, SyncError> {
        Ok(Self {
            store,
            coordinator: BulkCoordinator::new(config)?,
        })
    }

    /// Replace how retries wait. Returning an error from the strategy
    /// cancels the pending operation.
    pub fn with_sleep(mut self, sleeper: impl Sleep + Send + Sync + 'static) -> Self {
        self.coordinator = self.coordinator.with_sleep(sleeper);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn batch_size(&self) -> usize {
        self.coordinator.batch_size()
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Return the project named `name`, creating it if absent.
    ///
    /// Creation is a single retried write, not a bulk call.
    pub fn get_or_create_project(&mut self, name: &str) -> Result<Entity, SyncError> {
        if name.trim().is_empty() {
            return Err(SyncError::Validation("project name must be provided".to_owned()));
        }
        let project_type = EntityType::project();
        if let Some(existing) = self.store.get_by_unique_key(&project_type, name)? {
            return Ok(existing);
        }

        let mut fields = FieldMap::new();
        fields.insert("name".to_owned(), Value::String(name.to_owned()));
        let project = self.create_single("create_project", &project_type, fields)?;
        tracing::info!("project.created name={name} id={}", project.id);
        Ok(project)
    }

    /// Create one entity at `next_id` through the retry executor.
    pub(crate) fn create_single(
        &mut self,
        operation: &str,
        entity_type: &EntityType,
        fields: FieldMap,
    ) -> Result<Entity, SyncError> {
        let store = &mut self.store;
        self.coordinator.executor().execute(operation, || {
            let id = store.next_id(entity_type)?;
            let entity = Entity::new(id, entity_type.clone(), fields.clone());
            Ok(store.add(entity_type, entity)?)
        })
    }

    // -----------------------------------------------------------------------
    // Bulk operations
    // -----------------------------------------------------------------------

    pub fn bulk_create_entities(
        &mut self,
        entity_type: &str,
        payloads: Vec<FieldMap>,
    ) -> Result<Vec<Entity>, SyncError> {
        let entity_type = resolve_entity_type(entity_type)?;
        self.coordinator.create(&mut self.store, &entity_type, payloads)
    }

    /// Every payload must carry an integer `id`.
    pub fn bulk_update_entities(
        &mut self,
        entity_type: &str,
        updates: Vec<FieldMap>,
    ) -> Result<Vec<Entity>, SyncError> {
        let entity_type = resolve_entity_type(entity_type)?;
        self.coordinator.update(&mut self.store, &entity_type, updates)
    }

    pub fn bulk_delete_entities(
        &mut self,
        entity_type: &str,
        ids: &[EntityId],
    ) -> Result<(), SyncError> {
        let entity_type = resolve_entity_type(entity_type)?;
        self.coordinator.delete(&mut self.store, &entity_type, ids)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hierarchy templates
    // -----------------------------------------------------------------------

    /// Resolve (or create) `project`, then stamp out `template` beneath it.
    pub fn apply_hierarchy_template(
        &mut self,
        project: &str,
        template: &HierarchyTemplate,
        context: RenderContext,
    ) -> Result<HierarchyResult, SyncError> {
        let project = self.get_or_create_project(project)?;
        let result = HierarchyEngine::new(&self.coordinator).apply(
            &mut self.store,
            &project,
            template,
            context,
        )?;
        tracing::info!(
            "hierarchy.applied template={} project={} created={}",
            template.name(),
            project.id,
            result.len()
        );
        Ok(result)
    }

    pub fn save_hierarchy_template(
        &self,
        template: &HierarchyTemplate,
        path: &Path,
    ) -> Result<(), SyncError> {
        reelsync_template::save(template, path)?;
        tracing::info!("template.saved name={} path={}", template.name(), path.display());
        Ok(())
    }

    pub fn load_hierarchy_template(&self, path: &Path) -> Result<HierarchyTemplate, SyncError> {
        Ok(reelsync_template::load(path)?)
    }
}

/// Trim and validate a caller-supplied entity type.
pub(crate) fn resolve_entity_type(raw: &str) -> Result<EntityType, SyncError> {
    EntityType::new(raw)
        .map_err(|_| SyncError::Validation("entity_type must be provided".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use serde_json::json;

    #[test]
    fn blank_inputs_are_validation_errors() {
        let mut client = SyncClient::new();
        assert!(matches!(
            client.get_or_create_project("  "),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            client.bulk_create_entities(" ", vec![]),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            client.bulk_delete_entities("", &[1]),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn entity_type_is_trimmed() {
        let mut client = SyncClient::new();
        let mut fields = FieldMap::new();
        fields.insert("code".into(), json!("SH010"));
        let created = client.bulk_create_entities(" Shot ", vec![fields]).unwrap();
        assert_eq!(created[0].entity_type.as_str(), "Shot");
    }

    #[test]
    fn with_store_rejects_invalid_config() {
        let config = SyncConfig::new().with_batch_size(0);
        let err = SyncClient::with_store(MemoryStore::new(), &config).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let ok = SyncClient::with_store(
            MemoryStore::new(),
            &SyncConfig::new().with_batch_size(7).with_retry(RetryPolicy::no_retry()),
        )
        .unwrap();
        assert_eq!(ok.batch_size(), 7);
        assert_eq!(ok.coordinator.executor().policy().max_attempts, 1);
    }
}

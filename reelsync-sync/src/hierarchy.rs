//! Hierarchy template application.
//!
//! A template is walked pre-order. For every node:
//!
//! 1. The node's render context is the inherited context plus `parent`
//!    (the entity created for the parent node, or `null` at a root).
//! 2. Attributes are resolved against that context; `project_id` is
//!    injected unless the node sets it.
//! 3. One entity is created as a single-item bulk create.
//! 4. Children inherit the node's context plus `entity` (the new entity)
//!    and the node's resolved `context_updates`.
//!
//! Context updates are evaluated after `entity` is visible, so a node can
//! publish e.g. `parent_code: "{entity.code}"` for its subtree.

use std::collections::BTreeMap;

use serde_json::Value;

use reelsync_core::{Entity, EntityId, EntityStore, EntityType};
use reelsync_template::{HierarchyTemplate, RenderContext, TemplateNode};

use crate::bulk::BulkCoordinator;
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Entities created by one template application.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyResult {
    by_type: BTreeMap<String, Vec<Entity>>,
    created: Vec<Entity>,
}

impl HierarchyResult {
    fn record(&mut self, entity: Entity) {
        self.by_type
            .entry(entity.entity_type.to_string())
            .or_default()
            .push(entity.clone());
        self.created.push(entity);
    }

    /// Entities of one type, in creation order. Empty if none were created.
    pub fn get(&self, entity_type: &str) -> &[Entity] {
        self.by_type.get(entity_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every created entity, pre-order.
    pub fn created(&self) -> &[Entity] {
        &self.created
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// The entity-type -> entities mapping.
    pub fn into_map(self) -> BTreeMap<String, Vec<Entity>> {
        self.by_type
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Expands templates into entities through a [`BulkCoordinator`].
#[derive(Debug, Clone, Copy)]
pub struct HierarchyEngine<'a> {
    coordinator: &'a BulkCoordinator,
}

impl<'a> HierarchyEngine<'a> {
    pub fn new(coordinator: &'a BulkCoordinator) -> Self {
        Self { coordinator }
    }

    /// Apply `template` under an already-resolved `project`.
    ///
    /// The seed context is `{project: <project entity>}` overlaid with
    /// `context`. A failure part-way leaves the entities created so far in
    /// the store.
    pub fn apply<S>(
        &self,
        store: &mut S,
        project: &Entity,
        template: &HierarchyTemplate,
        context: RenderContext,
    ) -> Result<HierarchyResult, SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let mut seed = RenderContext::new();
        seed.insert_entity("project", project);
        seed.merge(context);

        let mut result = HierarchyResult::default();
        for root in template.roots() {
            self.visit(store, project.id, root, None, &seed, &mut result)?;
        }
        Ok(result)
    }

    fn visit<S>(
        &self,
        store: &mut S,
        project_id: EntityId,
        node: &TemplateNode,
        parent: Option<&Entity>,
        context: &RenderContext,
        result: &mut HierarchyResult,
    ) -> Result<(), SyncError>
    where
        S: EntityStore + ?Sized,
    {
        let mut scope = context.clone();
        scope.insert("parent", parent.map_or(Value::Null, Entity::to_value));

        let mut fields = node.resolve_attributes(&scope);
        fields
            .entry("project_id")
            .or_insert_with(|| Value::from(project_id));

        let entity_type = EntityType::new(node.entity_type())?;
        let created = self.coordinator.create_one(store, &entity_type, fields)?;
        tracing::debug!(
            "hierarchy.created type={entity_type} id={} parent={}",
            created.id,
            parent.map_or_else(|| "-".to_owned(), |p| p.id.to_string())
        );
        result.record(created.clone());

        scope.insert_entity("entity", &created);
        let updates = node.resolve_context_updates(&scope);
        scope.merge(updates);

        for child in node.children() {
            self.visit(store, project_id, child, Some(&created), &scope, result)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Template trees: [`TemplateNode`] and [`HierarchyTemplate`].
//!
//! Nodes are assembled with builder methods and frozen by
//! [`HierarchyTemplate::new`], which validates the whole tree. After that the
//! template is read-only; all variation comes from the context supplied when
//! it is applied.

use std::collections::BTreeMap;

use reelsync_core::EntityType;

use crate::context::RenderContext;
use crate::error::{invalid, TemplateError};
use crate::value::AttributeValue;

/// Ordered attribute mapping (name -> value source).
pub type Attributes = BTreeMap<String, AttributeValue>;

/// One entity to create, plus the subtree created beneath it.
#[derive(Debug, Clone)]
pub struct TemplateNode {
    entity_type: String,
    attributes: Attributes,
    children: Vec<TemplateNode>,
    context_updates: Attributes,
}

impl TemplateNode {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
            context_updates: Attributes::new(),
        }
    }

    /// Add (or replace) an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Append a child node.
    pub fn child(mut self, node: TemplateNode) -> Self {
        self.children.push(node);
        self
    }

    /// Add a context entry evaluated after this node's entity exists and
    /// visible to the whole subtree.
    pub fn context_update(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.context_updates.insert(key.into(), value);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn children(&self) -> &[TemplateNode] {
        &self.children
    }

    pub fn context_updates(&self) -> &Attributes {
        &self.context_updates
    }

    /// Resolve every attribute against `context`.
    pub fn resolve_attributes(&self, context: &RenderContext) -> serde_json::Map<String, serde_json::Value> {
        resolve_all(&self.attributes, context)
    }

    /// Resolve every context update against `context`.
    pub fn resolve_context_updates(&self, context: &RenderContext) -> RenderContext {
        resolve_all(&self.context_updates, context).into()
    }

    /// This node followed by all descendants, pre-order.
    pub fn expand(&self) -> Vec<&TemplateNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.expand());
        }
        nodes
    }

    fn validate(&self, path: &str) -> Result<(), TemplateError> {
        if EntityType::new(&self.entity_type).is_err() {
            return Err(invalid(format!("{path}: node must define an 'entity_type'")));
        }
        for (i, child) in self.children.iter().enumerate() {
            child.validate(&format!("{path}.children[{i}]"))?;
        }
        Ok(())
    }
}

fn resolve_all(
    attributes: &Attributes,
    context: &RenderContext,
) -> serde_json::Map<String, serde_json::Value> {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.resolve(context)))
        .collect()
}

/// A named, reusable forest of template nodes.
#[derive(Debug, Clone)]
pub struct HierarchyTemplate {
    name: String,
    roots: Vec<TemplateNode>,
}

impl HierarchyTemplate {
    /// Validate and freeze a template. The name must be non-blank and every
    /// node must carry a non-blank entity type.
    pub fn new(name: impl Into<String>, roots: Vec<TemplateNode>) -> Result<Self, TemplateError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(invalid("hierarchy template must include a non-empty 'name'"));
        }
        for (i, root) in roots.iter().enumerate() {
            root.validate(&format!("roots[{i}]"))?;
        }
        Ok(Self { name, roots })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roots(&self) -> &[TemplateNode] {
        &self.roots
    }

    /// Every node in the template, pre-order.
    pub fn expand(&self) -> Vec<&TemplateNode> {
        self.roots.iter().flat_map(TemplateNode::expand).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn episode_tree() -> TemplateNode {
        TemplateNode::new("Episode")
            .attr("code", AttributeValue::template("EP{episode:02d}"))
            .child(
                TemplateNode::new("Sequence")
                    .child(TemplateNode::new("Shot"))
                    .child(TemplateNode::new("Shot")),
            )
            .child(TemplateNode::new("Asset"))
    }

    #[test]
    fn expand_is_pre_order() {
        let template = HierarchyTemplate::new("show", vec![episode_tree()]).unwrap();
        let order: Vec<&str> = template.expand().iter().map(|n| n.entity_type()).collect();
        assert_eq!(order, vec!["Episode", "Sequence", "Shot", "Shot", "Asset"]);
    }

    #[test]
    fn rejects_blank_name() {
        let err = HierarchyTemplate::new("  ", vec![]).unwrap_err();
        assert!(err.to_string().contains("non-empty 'name'"), "got: {err}");
    }

    #[test]
    fn rejects_blank_entity_type_with_path() {
        let tree = TemplateNode::new("Episode").child(TemplateNode::new(" "));
        let err = HierarchyTemplate::new("show", vec![tree]).unwrap_err();
        assert!(err.to_string().contains("roots[0].children[0]"), "got: {err}");
    }

    #[test]
    fn resolves_attributes_and_updates() {
        let node = TemplateNode::new("Episode")
            .attr("code", AttributeValue::template("EP{episode:02d}"))
            .attr("status", AttributeValue::literal("wtg"))
            .context_update("parent_code", AttributeValue::template("{entity.code}"));
        let ctx = RenderContext::new()
            .with("episode", 4)
            .with("entity", json!({"code": "EP04"}));

        let attrs = node.resolve_attributes(&ctx);
        assert_eq!(attrs.get("code"), Some(&json!("EP04")));
        assert_eq!(attrs.get("status"), Some(&json!("wtg")));

        let updates = node.resolve_context_updates(&ctx);
        assert_eq!(updates.get("parent_code"), Some(&json!("EP04")));
    }
}

//! Render context: the named values visible to attribute resolution.
//!
//! Keys are plain strings. Lookups first try the whole key verbatim (so
//! `parent_code` or even `a.b` can be set directly), then fall back to a
//! dotted walk through nested objects and arrays: `project.name`,
//! `entity.frames.in`, `tags.0`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use reelsync_core::Entity;

/// Mapping of named JSON values threaded through template expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderContext(Map<String, Value>);

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Expose an entity under `key` in its flat object form.
    pub fn insert_entity(&mut self, key: impl Into<String>, entity: &Entity) {
        self.0.insert(key.into(), entity.to_value());
    }

    /// Overlay every entry of `other` onto this context; `other` wins.
    pub fn merge(&mut self, other: RenderContext) {
        for (key, value) in other.0 {
            self.0.insert(key, value);
        }
    }

    /// Top-level entry, no path walking.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolve a placeholder name: verbatim key first, then a dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// `id` of the entity stored under `key`, if any.
    pub fn entity_id(&self, key: &str) -> Option<u64> {
        self.0.get(key)?.get("id")?.as_u64()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RenderContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

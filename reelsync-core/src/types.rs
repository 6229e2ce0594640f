//! Domain types for the entity store.
//!
//! An [`Entity`] is a typed record: a numeric `id`, a `type` tag and a bag of
//! free-form JSON fields. Entities serialize flat, so the wire/document shape
//! is `{"id": 3, "type": "Shot", "code": "EP01_SQ05_SH12", ...}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Numeric entity id, unique within one entity type.
pub type EntityId = u64;

/// Free-form entity fields (everything except `id` and `type`).
pub type FieldMap = Map<String, Value>;

/// Conventional type tags.
pub const PROJECT: &str = "Project";
pub const VERSION: &str = "Version";
pub const PLAYLIST: &str = "Playlist";

/// Field names the store treats as unique-key candidates, in preference order.
pub const UNIQUE_KEY_FIELDS: [&str; 2] = ["name", "code"];

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A validated entity type tag (`"Project"`, `"Shot"`, ...).
///
/// Surrounding whitespace is trimmed; blank tags are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, StoreError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidEntityType);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn project() -> Self {
        Self(PROJECT.to_owned())
    }

    pub fn version() -> Self {
        Self(VERSION.to_owned())
    }

    pub fn playlist() -> Self {
        Self(PLAYLIST.to_owned())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for EntityType {
    type Error = StoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for EntityType {
    type Error = StoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.0
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl Entity {
    /// Build an entity. `id` / `type` keys inside `fields` are dropped; the
    /// explicit arguments always win.
    pub fn new(id: EntityId, entity_type: EntityType, mut fields: FieldMap) -> Self {
        fields.remove("id");
        fields.remove("type");
        Self {
            id,
            entity_type,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field as `&str`, if present and a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// The secondary lookup key: `name`, falling back to `code`.
    ///
    /// Empty strings and non-scalar values do not count as keys.
    pub fn unique_key(&self) -> Option<String> {
        UNIQUE_KEY_FIELDS
            .iter()
            .find_map(|field| self.fields.get(*field).and_then(key_text))
    }

    /// Shallow-merge `partial` into the fields. `id` / `type` are ignored so
    /// a merge can never change an entity's identity.
    pub fn merge(&mut self, partial: FieldMap) {
        for (key, value) in partial {
            if key == "id" || key == "type" {
                continue;
            }
            self.fields.insert(key, value);
        }
    }

    /// The flat JSON object form (`id`, `type` and every field).
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 2);
        object.insert("id".to_owned(), Value::from(self.id));
        object.insert(
            "type".to_owned(),
            Value::String(self.entity_type.as_str().to_owned()),
        );
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

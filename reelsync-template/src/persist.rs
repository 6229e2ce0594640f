//! Template files.
//!
//! # Document shape
//!
//! ```yaml
//! name: episodic
//! roots:
//!   - entity_type: Episode
//!     attributes: { code: "EP{episode:02d}" }
//!     context_updates: { parent_code: "{entity.code}" }
//!     children:
//!       - entity_type: Sequence
//!         attributes: { code: "{parent_code}_SQ{sequence:02d}" }
//! ```
//!
//! String attribute values load as format strings; other values as literals.
//! Derived attributes have no document form and refuse to save.
//!
//! # Format selection
//!
//! `.yaml` / `.yml` → YAML, anything else → JSON. Loading tries the format the
//! extension suggests first, then the other one. Saves go through a `.tmp`
//! sibling and a rename, so a crashed save never leaves a half-written file.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{invalid, io_err, TemplateError};
use crate::node::{Attributes, HierarchyTemplate, TemplateNode};
use crate::value::AttributeValue;

/// On-disk encoding of a template file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => TemplateFormat::Yaml,
            _ => TemplateFormat::Json,
        }
    }

    fn other(self) -> Self {
        match self {
            TemplateFormat::Yaml => TemplateFormat::Json,
            TemplateFormat::Json => TemplateFormat::Yaml,
        }
    }

    fn parse(self, raw: &str) -> Result<Value, TemplateError> {
        Ok(match self {
            TemplateFormat::Yaml => serde_yaml::from_str(raw)?,
            TemplateFormat::Json => serde_json::from_str(raw)?,
        })
    }

    fn encode(self, value: &Value) -> Result<String, TemplateError> {
        Ok(match self {
            TemplateFormat::Yaml => serde_yaml::to_string(value)?,
            TemplateFormat::Json => serde_json::to_string_pretty(value)?,
        })
    }
}

// ---------------------------------------------------------------------------
// 1. Value <-> template
// ---------------------------------------------------------------------------

impl HierarchyTemplate {
    /// Document form. Fails on the first `Derived` attribute.
    pub fn to_value(&self) -> Result<Value, TemplateError> {
        let roots = self
            .roots()
            .iter()
            .enumerate()
            .map(|(i, node)| node_to_value(node, &format!("roots[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;
        let mut doc = Map::new();
        doc.insert("name".to_owned(), Value::String(self.name().to_owned()));
        doc.insert("roots".to_owned(), Value::Array(roots));
        Ok(Value::Object(doc))
    }

    /// Build and validate a template from its document form.
    pub fn from_value(value: &Value) -> Result<Self, TemplateError> {
        let Value::Object(doc) = value else {
            return Err(invalid("hierarchy template definition must be a mapping"));
        };
        let name = match doc.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            _ => return Err(invalid("hierarchy template must include a non-empty 'name'")),
        };
        let roots = match doc.get("roots") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| node_from_value(item, &format!("roots[{i}]")))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(invalid("hierarchy template 'roots' must be a sequence")),
        };
        HierarchyTemplate::new(name, roots)
    }
}

fn node_to_value(node: &TemplateNode, path: &str) -> Result<Value, TemplateError> {
    let mut doc = Map::new();
    doc.insert(
        "entity_type".to_owned(),
        Value::String(node.entity_type().to_owned()),
    );
    doc.insert(
        "attributes".to_owned(),
        attributes_to_value(node.attributes(), &format!("{path}.attributes"))?,
    );
    if !node.context_updates().is_empty() {
        doc.insert(
            "context_updates".to_owned(),
            attributes_to_value(node.context_updates(), &format!("{path}.context_updates"))?,
        );
    }
    let children = node
        .children()
        .iter()
        .enumerate()
        .map(|(i, child)| node_to_value(child, &format!("{path}.children[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
    doc.insert("children".to_owned(), Value::Array(children));
    Ok(Value::Object(doc))
}

fn attributes_to_value(attributes: &Attributes, path: &str) -> Result<Value, TemplateError> {
    let mut out = Map::new();
    for (name, value) in attributes {
        let data = value.to_value().ok_or_else(|| TemplateError::NotSerializable {
            path: format!("{path}.{name}"),
        })?;
        out.insert(name.clone(), data);
    }
    Ok(Value::Object(out))
}

fn node_from_value(value: &Value, path: &str) -> Result<TemplateNode, TemplateError> {
    let Value::Object(doc) = value else {
        return Err(invalid(format!("{path}: template node must be a mapping")));
    };
    let entity_type = match doc.get("entity_type") {
        Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
        _ => return Err(invalid(format!("{path}: node must define an 'entity_type'"))),
    };

    let mut node = TemplateNode::new(entity_type);
    for (name, value) in attributes_from_value(doc.get("attributes"), path, "attributes")? {
        node = node.attr(name, value);
    }
    for (key, value) in attributes_from_value(doc.get("context_updates"), path, "context_updates")? {
        node = node.context_update(key, value);
    }
    match doc.get("children") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                node = node.child(node_from_value(item, &format!("{path}.children[{i}]"))?);
            }
        }
        Some(_) => return Err(invalid(format!("{path}: 'children' must be a sequence"))),
    }
    Ok(node)
}

fn attributes_from_value(
    value: Option<&Value>,
    path: &str,
    field: &str,
) -> Result<Vec<(String, AttributeValue)>, TemplateError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::from_value(v.clone())))
            .collect()),
        Some(_) => Err(invalid(format!("{path}: '{field}' must be a mapping"))),
    }
}

// ---------------------------------------------------------------------------
// 2. Files
// ---------------------------------------------------------------------------

/// Write `template` to `path`, creating parent directories as needed.
pub fn save(template: &HierarchyTemplate, path: &Path) -> Result<(), TemplateError> {
    let format = TemplateFormat::from_path(path);
    let encoded = format.encode(&template.to_value()?)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);

    std::fs::write(&tmp, encoded).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Read a template from `path`.
pub fn load(path: &Path) -> Result<HierarchyTemplate, TemplateError> {
    let raw = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let hint = TemplateFormat::from_path(path);

    let mut last_error = None;
    for format in [hint, hint.other()] {
        match format.parse(&raw) {
            Ok(value @ Value::Object(_)) => return HierarchyTemplate::from_value(&value),
            Ok(_) => return Err(invalid("hierarchy template file must contain a mapping")),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| invalid("hierarchy template file is empty")))
}

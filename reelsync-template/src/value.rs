//! Attribute values: literals, format strings and derivation closures.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::RenderContext;
use crate::format;

type DeriveFn = dyn Fn(&RenderContext) -> Value + Send + Sync;

/// A closure computing a value from the full render context.
#[derive(Clone)]
pub struct Derivation(Arc<DeriveFn>);

impl Derivation {
    pub fn new(f: impl Fn(&RenderContext) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, context: &RenderContext) -> Value {
        (self.0)(context)
    }
}

impl fmt::Debug for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Derivation(..)")
    }
}

/// How a template attribute obtains its value at apply time.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// Used as-is.
    Literal(Value),
    /// A `{placeholder}` format string, rendered to a JSON string.
    Template(String),
    /// Computed from the render context.
    Derived(Derivation),
}

impl AttributeValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }

    pub fn derived(f: impl Fn(&RenderContext) -> Value + Send + Sync + 'static) -> Self {
        Self::Derived(Derivation::new(f))
    }

    /// Evaluate against `context`. Never cached; every call re-evaluates.
    pub fn resolve(&self, context: &RenderContext) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Template(template) => Value::String(format::render(template, context)),
            Self::Derived(derivation) => derivation.call(context),
        }
    }

    /// Data form used when persisting templates; `None` for `Derived`.
    ///
    /// Strings always reload as `Template`, so a `Literal` string is written
    /// with its braces doubled; rendering it then yields the original text.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Literal(Value::String(text)) => {
                Some(Value::String(text.replace('{', "{{").replace('}', "}}")))
            }
            Self::Literal(value) => Some(value.clone()),
            Self::Template(template) => Some(Value::String(template.clone())),
            Self::Derived(_) => None,
        }
    }

    /// Inverse of [`AttributeValue::to_value`]: strings become templates,
    /// everything else a literal.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(template) => Self::Template(template),
            other => Self::Literal(other),
        }
    }
}

//! # reelsync-template
//!
//! Declarative entity-hierarchy templates.
//!
//! A [`HierarchyTemplate`] is a forest of [`TemplateNode`]s. Each node names
//! the entity type to create and maps field names to [`AttributeValue`]s,
//! which are resolved against a [`RenderContext`] when the template is
//! applied: literals pass through, `{placeholder}` strings are formatted,
//! and derivation closures compute values from the whole context.
//!
//! ```rust
//! use reelsync_template::{AttributeValue, HierarchyTemplate, RenderContext, TemplateNode};
//!
//! let episode = TemplateNode::new("Episode")
//!     .attr("code", AttributeValue::template("EP{episode:02d}"));
//! let template = HierarchyTemplate::new("episodic", vec![episode]).unwrap();
//!
//! let ctx = RenderContext::new().with("episode", 7);
//! let attrs = template.roots()[0].resolve_attributes(&ctx);
//! assert_eq!(attrs["code"], "EP07");
//! ```

pub mod context;
pub mod error;
pub mod format;
pub mod node;
pub mod persist;
pub mod value;

pub use context::RenderContext;
pub use error::TemplateError;
pub use node::{Attributes, HierarchyTemplate, TemplateNode};
pub use persist::{load, save, TemplateFormat};
pub use value::{AttributeValue, Derivation};

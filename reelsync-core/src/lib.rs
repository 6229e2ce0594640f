//! reelsync core library: entity types, the store contract and its errors.
//!
//! - [`types`]: [`Entity`], [`EntityType`] and field aliases
//! - [`error`]: [`StoreError`]
//! - [`store`]: the [`EntityStore`] trait and [`MemoryStore`]

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::{EntityStore, MemoryStore};
pub use types::{Entity, EntityId, EntityType, FieldMap};

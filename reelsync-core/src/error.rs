//! Error types for reelsync-core.

use thiserror::Error;

use crate::types::EntityId;

/// All errors that can arise from entity store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `update` / `delete` targeted an id that is not stored for that type.
    #[error("{entity_type} {id} does not exist")]
    NotFound { entity_type: String, id: EntityId },

    /// An entity type tag was empty or whitespace only.
    #[error("entity type must be a non-empty string")]
    InvalidEntityType,

    /// The backing store rejected the call for a transient reason
    /// (lost connection, throttling). Always safe to retry.
    #[error("entity store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    /// Convenience constructor for [`StoreError::NotFound`].
    pub fn not_found(entity_type: impl Into<String>, id: EntityId) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id,
        }
    }

    /// Convenience constructor for [`StoreError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

//! Error types for reelsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use reelsync_core::StoreError;
use reelsync_template::TemplateError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the entity store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error from template loading, saving or validation.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Malformed caller input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The retry budget ran out; `source` is the last failure.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Operation {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<SyncError>,
    },

    /// A chunk failed and undoing its partial effects failed too. The store
    /// may hold part of the chunk; retrying is unsafe.
    #[error("rollback of {entity_type} chunk failed ({failed} undo step(s) not applied): {cause}")]
    Rollback {
        entity_type: String,
        failed: usize,
        #[source]
        cause: Box<SyncError>,
    },

    /// Raised by a sleep strategy to abandon a pending retry loop.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config YAML parse error.
    #[error("config YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Config JSON parse error.
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the retry executor should try again after this failure.
    ///
    /// Store failures (including `NotFound`, which a remote backend can report
    /// transiently) are retried; everything describing bad input, local
    /// configuration or an already-settled outcome is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store(StoreError::InvalidEntityType) => false,
            SyncError::Store(_) => true,
            _ => false,
        }
    }

    /// The innermost error, looking through [`SyncError::Operation`] and
    /// [`SyncError::Rollback`] wrappers.
    pub fn root_cause(&self) -> &SyncError {
        match self {
            SyncError::Operation { source, .. } => source.root_cause(),
            SyncError::Rollback { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// `true` if the root cause is a store `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), SyncError::Store(StoreError::NotFound { .. }))
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

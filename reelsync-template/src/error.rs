//! Error types for reelsync-template.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from building, loading or saving templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Structural problem with a template definition.
    #[error("invalid hierarchy template: {0}")]
    Invalid(String),

    /// A `Derived` attribute has no data representation.
    #[error("attribute at {path} is derived and cannot be persisted")]
    NotSerializable { path: String },

    /// Filesystem error while reading or writing a template file.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML encode/decode error.
    #[error("template YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encode/decode error.
    #[error("template JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`TemplateError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TemplateError {
    TemplateError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> TemplateError {
    TemplateError::Invalid(message.into())
}

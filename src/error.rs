use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed payload at a store boundary.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(
        "lesson version '{version_id}' already exists with a different specHash \
         (existing {existing}, incoming {incoming}); use a new version id for updated content"
    )]
    Immutability {
        version_id: String,
        existing: String,
        incoming: String,
    },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A compiler phase's collaborator call rejected. Carried as data on the
    /// pipeline outcome, never returned from `compile`.
    #[error("pipeline phase `{phase}` failed: {message}")]
    PipelineStep { phase: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The NDJSON mirror could not be written. The events were already
    /// persisted to the log.
    #[error("failed to mirror events to {}: {message}", path.display())]
    Mirror { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

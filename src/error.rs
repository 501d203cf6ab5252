use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the tracker core.
///
/// Structural errors (self-dependency, cycle, has-children) are raised
/// before any mutation is applied, so a failed operation never leaves a
/// half-valid collection behind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Item cannot block itself: {0}")]
    SelfDependency(String),

    #[error("Ownership cycle detected at item: {0}")]
    Cycle(String),

    #[error("Item has children: {0}. Delete with cascade or move the children first")]
    HasChildren(String),

    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error(
        "Storage file is corrupted at {path}: {detail}.\n\
         Inspect the file or restore a problems.backup.*.json copy; \
         refusing to reset it to an empty collection"
    )]
    Corrupt { path: PathBuf, detail: String },

    #[error(
        "Storage at {path} uses the legacy problems/tasks schema. \
         Run `lt migrate` to convert it"
    )]
    UnmigratedSchema { path: PathBuf },

    #[error(
        "Cycle detected in legacy task parents at: {0}. \
         Migration aborted; the original file was not modified"
    )]
    MigrationCycle(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

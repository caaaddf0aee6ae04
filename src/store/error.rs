use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {}", .0.display())]
    DocumentNotFound(PathBuf),

    #[error("Document already exists: {}", .0.display())]
    DocumentExists(PathBuf),

    #[error("Refusing to commit unresolved document: {}", .0.display())]
    Unresolved(PathBuf),

    #[error("Store I/O failed")]
    Io(#[from] std::io::Error),

    #[error("Invalid snapshot data")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist snapshot {}: {reason}", .path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

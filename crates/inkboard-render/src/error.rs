//! Render and session errors.

use inkboard_core::{ShareError, StorageError};
use thiserror::Error;

/// Rasterization and codec errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to allocate a {width}x{height} surface")]
    SurfaceAlloc { width: u32, height: u32 },
    #[error("Failed to encode PNG: {0}")]
    Encode(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("{0} snapshot(s) in the compaction prefix are not loaded")]
    SnapshotsMissing(usize),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Anything a session operation can fail with.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Share(#[from] ShareError),
}

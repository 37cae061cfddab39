//! Error types for warden-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from rendering a configuration artifact.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// The daemon's listen value could not be resolved.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] warden_core::EndpointError),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}

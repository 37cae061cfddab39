//! Error types for warden-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use warden_core::EndpointError;
use warden_renderer::RenderError;
use warden_rpc::RpcError;

/// All errors that can abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Transport failure or remote fault from the daemon.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS service manager refused a lifecycle command.
    #[error("service error: {0}")]
    Service(String),

    #[error("unknown {kind} {name:?}")]
    UnknownOwner { kind: &'static str, name: String },

    /// A (kind, action) pair nothing knows how to run.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}

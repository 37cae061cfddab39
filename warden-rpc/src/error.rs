//! Error types for warden-rpc.

use std::time::Duration;

use thiserror::Error;

/// Socket-level failures. None of these are retried.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the stream failed (missing socket, permission denied, refused).
    #[error("cannot connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// A configured open/read/write timeout elapsed.
    #[error("{phase} timed out after {after:?} on {target}")]
    Timeout {
        target: String,
        phase: &'static str,
        after: Duration,
    },

    /// Reading or writing an established stream failed.
    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// The request could not be built (bad path or header value).
    #[error("invalid request for {target}: {detail}")]
    Request { target: String, detail: String },

    /// The peer did not speak HTTP/1.x as expected, or sent too much.
    #[error("malformed HTTP response from {target}: {detail}")]
    Malformed { target: String, detail: String },
}

/// All errors that can arise from a remote call.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The daemon answered with a non-2xx HTTP status.
    #[error("HTTP {status} {reason}")]
    Http { status: u16, reason: String },

    /// The daemon reported an XML-RPC fault.
    #[error("remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The payload was not the XML-RPC shape we expected.
    #[error("XML-RPC protocol error: {0}")]
    Protocol(String),

    /// Building the request document failed.
    #[error("XML-RPC encode error: {0}")]
    Encode(String),

    /// The daemon's listen value could not be resolved.
    #[error("endpoint error: {0}")]
    Endpoint(#[from] warden_core::EndpointError),
}

impl RpcError {
    /// Fault code if this is a remote fault.
    pub fn fault_code(&self) -> Option<i64> {
        match self {
            RpcError::Fault { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub(crate) fn io_err(target: impl Into<String>, source: std::io::Error) -> TransportError {
    TransportError::Io {
        target: target.into(),
        source,
    }
}

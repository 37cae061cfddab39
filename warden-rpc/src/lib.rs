//! Warden RPC — XML-RPC over HTTP/1.1 to a supervisor daemon.
//!
//! - [`transport`] — unix socket / TCP stream with timeouts
//! - [`wire`] — request framing and response parsing
//! - [`xmlrpc`] — [`Value`] model, call and response documents
//! - [`client`] — [`SupervisorApi`] and the [`RpcClient`] that implements it
//! - [`error`] — [`RpcError`], [`TransportError`]

pub mod client;
pub mod error;
pub mod transport;
pub mod wire;
pub mod xmlrpc;

pub use client::{ReloadDiff, RpcClient, SupervisorApi, NAMESPACE, RPC_PATH};
pub use error::{RpcError, TransportError};
pub use wire::{HttpResponse, MAX_RESPONSE_BYTES};
pub use transport::{Address, Connection, HttpTransport, UNIX_REQUEST_HOST, UNIX_REQUEST_PORT};
pub use xmlrpc::Value;

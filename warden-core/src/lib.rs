//! Warden core library — desired-state types, manifest loading, endpoint resolution.
//!
//! - [`types`] — newtypes and domain structs
//! - [`endpoint`] — listen value → [`ControlEndpoint`]
//! - [`manifest`] — load / validate
//! - [`error`] — [`ManifestError`], [`EndpointError`]

pub mod endpoint;
pub mod error;
pub mod manifest;
pub mod types;

pub use endpoint::{ControlEndpoint, Credentials, EndpointAddr, LOOPBACK_HOST};
pub use error::{EndpointError, ManifestError};
pub use types::{
    Action, Daemon, EntityKind, EntityRef, FcgiProgram, Group, GroupName, ListenSpec, Manifest,
    Overlay, Program, ProgramName, Scalar, Timeouts,
};

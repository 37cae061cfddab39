//! # warden-reconcile
//!
//! Brings a daemon's on-disk configuration and running process groups in line
//! with a manifest.
//!
//! Build a [`Runner`] (usually [`Runner::standard`]) and call
//! [`Runner::apply`] for a whole manifest, or [`Runner::run_one`] for a single
//! action. [`diff_manifest`] shows what `apply` would change on disk.

pub mod diff;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod service;
pub mod writer;

pub use diff::{diff_daemon, diff_manifest, FileDiff};
pub use driver::{ActionHandler, Context, HandlerRegistry, Reconciler, Target};
pub use error::ReconcileError;
pub use pipeline::{find_daemon, find_target, rpc_connector, ApplyOptions, Connector, Runner};
pub use report::{ActionReport, DaemonReport, Outcome, RunReport};
pub use service::{ServiceLifecycle, ServiceVerb, Systemctl};
pub use writer::Ownership;

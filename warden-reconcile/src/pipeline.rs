//! Run entry points shared by `apply`, `plan` and `ctl`.
//!
//! The RPC client for a daemon is built once, before its first action, and
//! dropped when that daemon is done. Daemons are processed in manifest order
//! and the first error stops the run.

use warden_core::types::{Action, Daemon, EntityKind, Manifest};
use warden_renderer::source::has_ambiguous_listen;
use warden_renderer::Renderer;
use warden_rpc::{RpcClient, SupervisorApi};

use crate::driver::{Context, HandlerRegistry, Reconciler, Target};
use crate::error::ReconcileError;
use crate::report::{ActionReport, DaemonReport, RunReport};
use crate::service::{ServiceLifecycle, Systemctl};
use crate::writer::Ownership;

/// Options for a reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Render and compare only; no writes, deletions, or remote calls.
    pub dry_run: bool,
    /// Skip the daemon's own actions (enable, ...) and only touch entities.
    pub skip_daemon_actions: bool,
}

/// Builds the [`SupervisorApi`] for a daemon.
pub type Connector<'a> = dyn Fn(&Daemon) -> Result<Box<dyn SupervisorApi>, ReconcileError> + 'a;

/// Connect through XML-RPC at the daemon's resolved endpoint.
pub fn rpc_connector(daemon: &Daemon) -> Result<Box<dyn SupervisorApi>, ReconcileError> {
    let client = RpcClient::for_daemon(daemon)?;
    tracing::debug!(daemon = %daemon.name, endpoint = %client.endpoint(), "rpc client ready");
    Ok(Box::new(client))
}

/// Collaborators for a run. [`Runner::standard`] wires the real ones.
pub struct Runner<'a> {
    pub registry: HandlerRegistry,
    pub renderer: &'a Renderer,
    pub service: &'a dyn ServiceLifecycle,
    pub connect: &'a Connector<'a>,
}

impl<'a> Runner<'a> {
    pub fn standard(renderer: &'a Renderer, service: &'a Systemctl) -> Self {
        Self {
            registry: HandlerRegistry::standard(),
            renderer,
            service,
            connect: &rpc_connector,
        }
    }

    fn with_context<T>(
        &self,
        daemon: &Daemon,
        options: ApplyOptions,
        f: impl FnOnce(&Reconciler<'_>) -> Result<T, ReconcileError>,
    ) -> Result<T, ReconcileError> {
        if has_ambiguous_listen(daemon) {
            tracing::warn!(
                daemon = %daemon.name,
                listen = ?daemon.listen,
                "listen value is neither [host:]port nor an absolute path; treating it as a unix socket path"
            );
        }
        let api = (self.connect)(daemon)?;
        let ctx = Context {
            daemon,
            api: api.as_ref(),
            service: self.service,
            renderer: self.renderer,
            ownership: Ownership::for_daemon(daemon)?,
            dry_run: options.dry_run,
        };
        f(&Reconciler::new(&self.registry, ctx))
    }

    /// Reconcile one daemon and everything it owns.
    pub fn apply_daemon(&self, daemon: &Daemon, options: ApplyOptions) -> Result<DaemonReport, ReconcileError> {
        tracing::info!(daemon = %daemon.name, dry_run = options.dry_run, "reconciling");
        self.with_context(daemon, options, |r| r.reconcile(!options.skip_daemon_actions))
    }

    /// Reconcile every daemon in the manifest.
    pub fn apply(&self, manifest: &Manifest, options: ApplyOptions) -> Result<RunReport, ReconcileError> {
        let mut report = RunReport {
            dry_run: options.dry_run,
            daemons: Vec::new(),
        };
        for daemon in &manifest.daemons {
            report.daemons.push(self.apply_daemon(daemon, options)?);
        }
        Ok(report)
    }

    /// Run one action against one named target, ignoring declared actions.
    pub fn run_one(
        &self,
        daemon: &Daemon,
        kind: EntityKind,
        name: &str,
        action: Action,
        options: ApplyOptions,
    ) -> Result<ActionReport, ReconcileError> {
        let target = find_target(daemon, kind, name).ok_or_else(|| {
            ReconcileError::InvariantViolation(format!(
                "daemon {} has no {kind} named {name:?}",
                daemon.name
            ))
        })?;
        self.with_context(daemon, options, |r| r.run_action(target, action))
    }
}

/// Locate a target by kind and name within `daemon`.
pub fn find_target<'a>(daemon: &'a Daemon, kind: EntityKind, name: &str) -> Option<Target<'a>> {
    if kind == EntityKind::Daemon {
        return (daemon.name == name).then_some(Target::Daemon(daemon));
    }
    daemon
        .entities()
        .into_iter()
        .find(|e| e.kind() == kind && e.name() == name)
        .map(Target::Entity)
}

/// Find a daemon by name.
pub fn find_daemon<'a>(manifest: &'a Manifest, name: &str) -> Option<&'a Daemon> {
    manifest.daemons.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::types::{Group, ListenSpec, Program};

    fn daemon() -> Daemon {
        let mut d = Daemon::new("supervisor");
        d.groups = vec![Group::new("web")];
        d.programs = vec![Program::new("api", "/bin/api")];
        d
    }

    #[test]
    fn find_target_by_kind_and_name() {
        let d = daemon();
        assert!(matches!(
            find_target(&d, EntityKind::Program, "api"),
            Some(Target::Entity(_))
        ));
        assert!(find_target(&d, EntityKind::Group, "api").is_none());
        assert!(matches!(
            find_target(&d, EntityKind::Daemon, "supervisor"),
            Some(Target::Daemon(_))
        ));
        assert!(find_target(&d, EntityKind::Daemon, "other").is_none());
    }

    #[test]
    fn rpc_connector_builds_client_without_io() {
        let mut d = daemon();
        d.listen = Some(ListenSpec::Port(9001));
        assert!(rpc_connector(&d).is_ok());
    }
}

//! Reconciliation driver.
//!
//! Each entity kind has an [`ActionHandler`]; the [`HandlerRegistry`] maps
//! kinds to handlers and refuses anything it has no entry for. Handlers share
//! the free functions below (`add`, `remove`, `reread`, ...) and differ only in
//! which remote call or service verb `start`/`stop` map to.
//!
//! Every action runs to completion or returns the first error. Nothing already
//! written or called is rolled back.

use std::collections::HashMap;

use warden_core::types::{Action, Daemon, EntityKind, EntityRef};
use warden_renderer::{source_for, ConfigSource, Renderer};
use warden_rpc::{RpcError, SupervisorApi, NAMESPACE};

use crate::error::ReconcileError;
use crate::report::{ActionReport, DaemonReport, Outcome};
use crate::service::{ServiceLifecycle, ServiceVerb};
use crate::writer::{self, Ownership};

// ---------------------------------------------------------------------------
// Targets and context
// ---------------------------------------------------------------------------

/// Anything an action can be applied to.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Daemon(&'a Daemon),
    Entity(EntityRef<'a>),
}

impl<'a> Target<'a> {
    pub fn kind(&self) -> EntityKind {
        match self {
            Target::Daemon(_) => EntityKind::Daemon,
            Target::Entity(e) => e.kind(),
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            Target::Daemon(d) => d.name.as_str(),
            Target::Entity(e) => e.name(),
        }
    }

    pub fn source(&self) -> &'a dyn ConfigSource {
        match *self {
            Target::Daemon(d) => d as &dyn ConfigSource,
            Target::Entity(e) => source_for(e),
        }
    }
}

/// Everything an action needs, built once per daemon.
pub struct Context<'a> {
    pub daemon: &'a Daemon,
    pub api: &'a dyn SupervisorApi,
    pub service: &'a dyn ServiceLifecycle,
    pub renderer: &'a Renderer,
    pub ownership: Ownership,
    pub dry_run: bool,
}

impl Context<'_> {
    /// Issue one remote call, or record that it would have been issued.
    fn call<F>(&self, out: &mut Vec<Outcome>, call: String, f: F) -> Result<(), ReconcileError>
    where
        F: FnOnce(&dyn SupervisorApi) -> Result<(), RpcError>,
    {
        if self.dry_run {
            out.push(Outcome::WouldCall { call });
            return Ok(());
        }
        f(self.api)?;
        tracing::info!(daemon = %self.daemon.name, %call, "called");
        out.push(Outcome::Called { call });
        Ok(())
    }

    fn run_service(&self, out: &mut Vec<Outcome>, verb: ServiceVerb) -> Result<(), ReconcileError> {
        let call = format!("service {} {}", verb.as_str(), self.daemon.name);
        if self.dry_run {
            out.push(Outcome::WouldCall { call });
            return Ok(());
        }
        self.service.run(verb, &self.daemon.name)?;
        out.push(Outcome::Called { call });
        Ok(())
    }
}

fn rpc_name(method: &str, arg: &str) -> String {
    format!("{NAMESPACE}.{method}({arg})")
}

// ---------------------------------------------------------------------------
// Shared actions
// ---------------------------------------------------------------------------

/// Write the target's artifact if its content changed, then reread.
pub fn add(ctx: &Context<'_>, target: Target<'_>, out: &mut Vec<Outcome>) -> Result<(), ReconcileError> {
    let rendered = ctx.renderer.render(target.source(), ctx.daemon)?;
    let outcome = writer::write_config(&rendered.path, &rendered.content, &ctx.ownership, ctx.dry_run)?;
    let changed = !matches!(outcome, Outcome::Unchanged { .. });
    out.push(outcome);
    if changed {
        reread(ctx, out)?;
    }
    Ok(())
}

/// Delete the target's artifact if present, then reread.
pub fn remove(ctx: &Context<'_>, target: Target<'_>, out: &mut Vec<Outcome>) -> Result<(), ReconcileError> {
    let path = target.source().config_path(ctx.daemon);
    let outcome = writer::delete_config(&path, ctx.dry_run)?;
    let changed = !matches!(outcome, Outcome::Absent { .. });
    out.push(outcome);
    if changed {
        reread(ctx, out)?;
    }
    Ok(())
}

/// `reloadConfig`, then add every added group and remove every removed one.
///
/// `changed` groups are left alone; the daemon applies those in place.
pub fn reread(ctx: &Context<'_>, out: &mut Vec<Outcome>) -> Result<(), ReconcileError> {
    let call = format!("{NAMESPACE}.reloadConfig()");
    if ctx.dry_run {
        out.push(Outcome::WouldCall { call });
        return Ok(());
    }

    let diff = ctx.api.reload_config()?;
    tracing::info!(
        daemon = %ctx.daemon.name,
        added = ?diff.added,
        changed = ?diff.changed,
        removed = ?diff.removed,
        "reloaded config"
    );
    out.push(Outcome::Called { call });

    for name in &diff.added {
        ctx.call(out, rpc_name("addProcessGroup", name), |api| {
            api.add_process_group(name)
        })?;
    }
    for name in &diff.removed {
        ctx.call(out, rpc_name("removeProcessGroup", name), |api| {
            api.remove_process_group(name)
        })?;
    }
    Ok(())
}

fn unsupported(kind: EntityKind, action: Action) -> ReconcileError {
    ReconcileError::InvariantViolation(format!("{kind} does not support action {action}"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Runs actions for one entity kind.
pub trait ActionHandler {
    /// Actions this handler accepts.
    fn supports(&self) -> &'static [Action];

    fn apply(
        &self,
        ctx: &Context<'_>,
        target: Target<'_>,
        action: Action,
        out: &mut Vec<Outcome>,
    ) -> Result<(), ReconcileError>;
}

const ENTITY_ACTIONS: &[Action] = &[
    Action::Add,
    Action::Remove,
    Action::Start,
    Action::Stop,
    Action::Restart,
];

/// Programs and fcgi programs: start/stop address a single process.
pub struct ProgramHandler;

impl ActionHandler for ProgramHandler {
    fn supports(&self) -> &'static [Action] {
        ENTITY_ACTIONS
    }

    fn apply(
        &self,
        ctx: &Context<'_>,
        target: Target<'_>,
        action: Action,
        out: &mut Vec<Outcome>,
    ) -> Result<(), ReconcileError> {
        let name = target.name();
        let start = |out: &mut Vec<Outcome>| {
            ctx.call(out, rpc_name("startProcess", name), |api| api.start_process(name))
        };
        let stop = |out: &mut Vec<Outcome>| {
            ctx.call(out, rpc_name("stopProcess", name), |api| api.stop_process(name))
        };
        match action {
            Action::Add => add(ctx, target, out),
            Action::Remove => remove(ctx, target, out),
            Action::Start => start(out),
            Action::Stop => stop(out),
            Action::Restart => {
                stop(out)?;
                start(out)
            }
            other => Err(unsupported(target.kind(), other)),
        }
    }
}

/// Groups: start/stop address every process in the group.
pub struct GroupHandler;

impl ActionHandler for GroupHandler {
    fn supports(&self) -> &'static [Action] {
        ENTITY_ACTIONS
    }

    fn apply(
        &self,
        ctx: &Context<'_>,
        target: Target<'_>,
        action: Action,
        out: &mut Vec<Outcome>,
    ) -> Result<(), ReconcileError> {
        let name = target.name();
        let start = |out: &mut Vec<Outcome>| {
            ctx.call(out, rpc_name("startProcessGroup", name), |api| {
                api.start_process_group(name)
            })
        };
        let stop = |out: &mut Vec<Outcome>| {
            ctx.call(out, rpc_name("stopProcessGroup", name), |api| {
                api.stop_process_group(name)
            })
        };
        match action {
            Action::Add => add(ctx, target, out),
            Action::Remove => remove(ctx, target, out),
            Action::Start => start(out),
            Action::Stop => stop(out),
            Action::Restart => {
                stop(out)?;
                start(out)
            }
            other => Err(unsupported(target.kind(), other)),
        }
    }
}

/// The daemon itself: lifecycle goes to the service manager.
pub struct DaemonHandler;

impl ActionHandler for DaemonHandler {
    fn supports(&self) -> &'static [Action] {
        &[
            Action::Enable,
            Action::Disable,
            Action::Start,
            Action::Stop,
            Action::Restart,
            Action::Reload,
            Action::Reread,
        ]
    }

    fn apply(
        &self,
        ctx: &Context<'_>,
        target: Target<'_>,
        action: Action,
        out: &mut Vec<Outcome>,
    ) -> Result<(), ReconcileError> {
        match action {
            Action::Enable => {
                writer::ensure_confd(&ctx.daemon.confd_path(), &ctx.ownership, ctx.dry_run)?;
                let rendered = ctx.renderer.render(target.source(), ctx.daemon)?;
                out.push(writer::write_config(
                    &rendered.path,
                    &rendered.content,
                    &ctx.ownership,
                    ctx.dry_run,
                )?);
                ctx.run_service(out, ServiceVerb::Enable)?;
                ctx.run_service(out, ServiceVerb::Start)
            }
            Action::Disable => {
                ctx.run_service(out, ServiceVerb::Stop)?;
                ctx.run_service(out, ServiceVerb::Disable)
            }
            Action::Start => ctx.run_service(out, ServiceVerb::Start),
            Action::Stop => ctx.run_service(out, ServiceVerb::Stop),
            Action::Restart => {
                ctx.run_service(out, ServiceVerb::Stop)?;
                ctx.run_service(out, ServiceVerb::Start)
            }
            Action::Reload => ctx.run_service(out, ServiceVerb::Reload),
            Action::Reread => reread(ctx, out),
            other => Err(unsupported(target.kind(), other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Explicit map from entity kind to its handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityKind, Box<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Handlers for every built-in kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityKind::Daemon, Box::new(DaemonHandler));
        registry.register(EntityKind::Group, Box::new(GroupHandler));
        registry.register(EntityKind::Program, Box::new(ProgramHandler));
        registry.register(EntityKind::FcgiProgram, Box::new(ProgramHandler));
        registry
    }

    pub fn register(&mut self, kind: EntityKind, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// The handler for `kind`, checked against `action`.
    pub fn resolve(&self, kind: EntityKind, action: Action) -> Result<&dyn ActionHandler, ReconcileError> {
        let handler = self.handlers.get(&kind).ok_or_else(|| {
            ReconcileError::InvariantViolation(format!("no handler registered for {kind}"))
        })?;
        if !handler.supports().contains(&action) {
            return Err(unsupported(kind, action));
        }
        Ok(handler.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Drives one daemon's actions, then each owned entity's, in order.
pub struct Reconciler<'a> {
    registry: &'a HandlerRegistry,
    ctx: Context<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a HandlerRegistry, ctx: Context<'a>) -> Self {
        Self { registry, ctx }
    }

    pub fn context(&self) -> &Context<'a> {
        &self.ctx
    }

    /// Run a single action against `target`.
    pub fn run_action(&self, target: Target<'_>, action: Action) -> Result<ActionReport, ReconcileError> {
        let handler = self.registry.resolve(target.kind(), action)?;
        tracing::debug!(kind = %target.kind(), name = target.name(), %action, "action");
        let mut outcomes = Vec::new();
        handler.apply(&self.ctx, target, action, &mut outcomes)?;
        Ok(ActionReport {
            kind: target.kind(),
            name: target.name().to_string(),
            action,
            outcomes,
        })
    }

    /// Daemon actions (when `include_daemon`), then entity actions.
    ///
    /// Entities go programs first, groups last; `remove` actions are held
    /// back and run afterwards in the opposite order.
    pub fn reconcile(&self, include_daemon: bool) -> Result<DaemonReport, ReconcileError> {
        let daemon = self.ctx.daemon;
        let mut report = DaemonReport::new(&daemon.name);

        if include_daemon {
            for action in &daemon.actions {
                report.actions.push(self.run_action(Target::Daemon(daemon), *action)?);
            }
        }
        let order = daemon.apply_order();
        for entity in &order {
            for action in entity.actions().iter().filter(|a| **a != Action::Remove) {
                report.actions.push(self.run_action(Target::Entity(*entity), *action)?);
            }
        }
        for entity in order.iter().rev() {
            if entity.actions().contains(&Action::Remove) {
                report
                    .actions
                    .push(self.run_action(Target::Entity(*entity), Action::Remove)?);
            }
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

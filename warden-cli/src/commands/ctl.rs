//! `warden ctl` — run one action against one target, whatever the manifest declares.

use anyhow::{Context, Result};
use clap::Args;

use warden_core::{Action, EntityKind};
use warden_reconcile::{ApplyOptions, Runner, Systemctl};

use super::{outcome_mark, select_daemon, ManifestArgs};

#[derive(Args, Debug)]
pub struct CtlArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// add, remove, start, stop, restart, reread, enable, disable or reload.
    pub action: Action,

    /// daemon, group, program or fcgi-program.
    pub kind: EntityKind,

    pub name: String,

    /// Daemon that owns the target (required when the manifest has several).
    #[arg(long)]
    pub daemon: Option<String>,

    #[arg(long)]
    pub dry_run: bool,

    /// Service manager binary used for daemon lifecycle actions.
    #[arg(long, value_name = "PROGRAM", default_value = "systemctl")]
    pub systemctl: String,
}

impl CtlArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let renderer = self.manifest.renderer()?;
        let service = Systemctl::with_program(self.systemctl.clone());
        let runner = Runner::standard(&renderer, &service);

        // A daemon target names itself; otherwise fall back to --daemon.
        let owner = match (self.kind, &self.daemon) {
            (EntityKind::Daemon, None) => Some(self.name.as_str()),
            (_, name) => name.as_deref(),
        };
        let daemon = select_daemon(&manifest, owner)?;

        let options = ApplyOptions {
            dry_run: self.dry_run,
            skip_daemon_actions: false,
        };
        let report = runner
            .run_one(daemon, self.kind, &self.name, self.action, options)
            .with_context(|| format!("{} {}:{} failed", self.action, self.kind, self.name))?;

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        println!("{prefix}✓ {} {}:{}", report.action, report.kind, report.name);
        for outcome in &report.outcomes {
            println!("    {}  {}", outcome_mark(outcome), outcome.subject());
        }
        Ok(())
    }
}

//! `warden apply` and `warden plan` — reconcile a manifest, or preview it.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use warden_core::Manifest;
use warden_reconcile::{ApplyOptions, DaemonReport, RunReport, Runner, Systemctl};

use super::{is_change, outcome_mark, select_daemon, ManifestArgs};

/// Arguments for `warden apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Only reconcile this daemon.
    #[arg(long)]
    pub daemon: Option<String>,

    /// Show what would be written and called without doing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Leave the daemon's own actions (enable, start, ...) alone.
    #[arg(long)]
    pub skip_daemon: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Service manager binary used for daemon lifecycle actions.
    #[arg(long, value_name = "PROGRAM", default_value = "systemctl")]
    pub systemctl: String,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let renderer = self.manifest.renderer()?;
        let service = Systemctl::with_program(self.systemctl.clone());
        let runner = Runner::standard(&renderer, &service);
        let options = ApplyOptions {
            dry_run: self.dry_run,
            skip_daemon_actions: self.skip_daemon,
        };

        let report = run(&runner, &manifest, self.daemon.as_deref(), options)?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
        } else {
            for daemon in &report.daemons {
                print_results(daemon, self.dry_run);
            }
        }
        Ok(())
    }
}

/// Arguments for `warden plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Only plan this daemon.
    #[arg(long)]
    pub daemon: Option<String>,

    /// Leave the daemon's own actions out of the plan.
    #[arg(long)]
    pub skip_daemon: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct PlanRow {
    #[tabled(rename = "daemon")]
    daemon: String,
    #[tabled(rename = "entity")]
    entity: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "effect")]
    effect: String,
    #[tabled(rename = "target")]
    target: String,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let renderer = self.manifest.renderer()?;
        let service = Systemctl::default();
        let runner = Runner::standard(&renderer, &service);
        let options = ApplyOptions {
            dry_run: true,
            skip_daemon_actions: self.skip_daemon,
        };

        let report = run(&runner, &manifest, self.daemon.as_deref(), options)?;

        let rows: Vec<PlanRow> = report
            .daemons
            .iter()
            .flat_map(|d| {
                d.actions.iter().flat_map(move |a| {
                    a.outcomes.iter().map(move |o| PlanRow {
                        daemon: d.daemon.clone(),
                        entity: format!("{}:{}", a.kind, a.name),
                        action: a.action.to_string(),
                        effect: o.label().to_string(),
                        target: o.subject(),
                    })
                })
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize plan")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No declared actions.");
            return Ok(());
        }
        let changes = report.outcomes().filter(|o| is_change(o)).count();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{changes} pending effect(s)");
        Ok(())
    }
}

fn run(
    runner: &Runner<'_>,
    manifest: &Manifest,
    daemon: Option<&str>,
    options: ApplyOptions,
) -> Result<RunReport> {
    match daemon {
        Some(name) => {
            let daemon = select_daemon(manifest, Some(name))?;
            let report = runner
                .apply_daemon(daemon, options)
                .with_context(|| format!("reconcile failed for daemon '{name}'"))?;
            Ok(RunReport {
                dry_run: options.dry_run,
                daemons: vec![report],
            })
        }
        None => runner.apply(manifest, options).context("reconcile failed"),
    }
}

fn print_results(report: &DaemonReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let outcomes: Vec<_> = report.outcomes().collect();
    let changed = outcomes.iter().filter(|o| is_change(o)).count();
    let unchanged = outcomes.len() - changed;

    if outcomes.is_empty() {
        println!("{prefix}✓ '{}' has no declared actions", report.daemon);
        return;
    }

    println!(
        "{prefix}✓ '{}' reconciled ({} changed, {} unchanged)",
        report.daemon, changed, unchanged
    );
    for action in &report.actions {
        println!("  {} {}:{}", action.action, action.kind, action.name);
        for outcome in &action.outcomes {
            println!("    {}  {}", outcome_mark(outcome), outcome.subject());
        }
    }
}

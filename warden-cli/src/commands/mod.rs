pub mod apply;
pub mod check;
pub mod ctl;
pub mod diff;
pub mod endpoint;
pub mod render;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use warden_core::{manifest, Daemon, Manifest};
use warden_reconcile::Outcome;
use warden_renderer::Renderer;

/// Arguments shared by every manifest-driven command.
#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Path to the YAML manifest.
    pub manifest: PathBuf,

    /// Directory of `.tera` templates that entities may name.
    #[arg(long, value_name = "DIR")]
    pub template_dir: Option<PathBuf>,
}

impl ManifestArgs {
    pub fn load(&self) -> Result<Manifest> {
        manifest::load_at(&self.manifest)
            .with_context(|| format!("failed to load manifest {}", self.manifest.display()))
    }

    pub fn renderer(&self) -> Result<Renderer> {
        Renderer::with_template_dir(self.template_dir.as_deref())
            .context("failed to load templates")
    }
}

/// Pick a daemon by name, or the only one when no name is given.
pub fn select_daemon<'a>(manifest: &'a Manifest, name: Option<&str>) -> Result<&'a Daemon> {
    match name {
        Some(name) => warden_reconcile::find_daemon(manifest, name)
            .with_context(|| format!("no daemon named '{name}' in manifest")),
        None => match manifest.daemons.as_slice() {
            [only] => Ok(only),
            [] => bail!("manifest declares no daemons"),
            _ => bail!("manifest declares several daemons; pass --daemon <name>"),
        },
    }
}

/// One-character status mark for an outcome.
pub fn outcome_mark(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Written { .. } => "✎".green().to_string(),
        Outcome::Deleted { .. } => "✗".red().to_string(),
        Outcome::Called { .. } => "→".cyan().to_string(),
        Outcome::WouldWrite { .. } | Outcome::WouldDelete { .. } | Outcome::WouldCall { .. } => {
            "~".yellow().to_string()
        }
        Outcome::Unchanged { .. } | Outcome::Absent { .. } => "·".bright_black().to_string(),
    }
}

/// Whether an outcome changed (or would change) anything.
pub fn is_change(outcome: &Outcome) -> bool {
    !matches!(outcome, Outcome::Unchanged { .. } | Outcome::Absent { .. })
}

//! `warden render` — print rendered artifacts to stdout.

use anyhow::{bail, Context, Result};
use clap::Args;

use warden_core::EntityKind;
use warden_reconcile::{find_target, Target};

use super::{select_daemon, ManifestArgs};

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Daemon to render (required when the manifest has several).
    #[arg(long)]
    pub daemon: Option<String>,

    /// Render only `<kind>:<name>`, e.g. `program:api` or `daemon:supervisor`.
    #[arg(long, value_name = "KIND:NAME")]
    pub entity: Option<String>,
}

impl RenderArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let renderer = self.manifest.renderer()?;

        let daemons = match (&self.daemon, &self.entity) {
            (None, None) => manifest.daemons.iter().collect::<Vec<_>>(),
            _ => vec![select_daemon(&manifest, self.daemon.as_deref())?],
        };

        if let Some(spec) = &self.entity {
            let (kind, name) = spec
                .split_once(':')
                .with_context(|| format!("expected <kind>:<name>, got '{spec}'"))?;
            let kind: EntityKind = kind.parse().map_err(anyhow::Error::msg)?;
            let daemon = daemons[0];
            let Some(target) = find_target(daemon, kind, name) else {
                bail!("daemon '{}' has no {kind} named '{name}'", daemon.name);
            };
            let out = match target {
                Target::Daemon(d) => renderer.render(d, d),
                Target::Entity(e) => renderer.render_entity(e, daemon),
            }
            .with_context(|| format!("failed to render {spec}"))?;
            print!("{}", out.content);
            return Ok(());
        }

        for daemon in daemons {
            let outputs = renderer
                .render_all(daemon)
                .with_context(|| format!("failed to render daemon '{}'", daemon.name))?;
            for out in outputs {
                println!("# {}", out.path.display());
                print!("{}", out.content);
                println!();
            }
        }
        Ok(())
    }
}

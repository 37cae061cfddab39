//! `warden check` — load and validate a manifest without touching anything.

use anyhow::Result;
use clap::Args;

use super::ManifestArgs;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        for daemon in &manifest.daemons {
            let entities = daemon.entities();
            println!(
                "✓ daemon '{}': {} groups, {} programs, {} fcgi programs ({} entities)",
                daemon.name,
                daemon.groups.len(),
                daemon.programs.len(),
                daemon.fcgi_programs.len(),
                entities.len()
            );
        }
        Ok(())
    }
}

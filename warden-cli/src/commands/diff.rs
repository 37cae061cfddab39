//! `warden diff <manifest>` — show unified diffs for what apply would write.

use anyhow::{Context, Result};
use clap::Args;

use warden_reconcile::diff_manifest;

use super::ManifestArgs;

/// Arguments for `warden diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let renderer = self.manifest.renderer()?;

        let diffs = diff_manifest(&manifest, &renderer).context("diff failed")?;
        if diffs.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}

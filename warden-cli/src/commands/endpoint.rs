//! `warden endpoint` — show how each daemon will be reached.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use warden_core::endpoint::{is_ambiguous_path, EndpointAddr};

use super::{select_daemon, ManifestArgs};

#[derive(Args, Debug)]
pub struct EndpointArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Only this daemon.
    #[arg(long)]
    pub daemon: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct EndpointRow {
    #[tabled(rename = "daemon")]
    daemon: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "server url")]
    server_url: String,
    #[tabled(rename = "auth")]
    auth: bool,
    #[tabled(rename = "ambiguous")]
    ambiguous: bool,
}

impl EndpointArgs {
    pub fn run(self) -> Result<()> {
        let manifest = self.manifest.load()?;
        let daemons = match &self.daemon {
            Some(name) => vec![select_daemon(&manifest, Some(name))?],
            None => manifest.daemons.iter().collect(),
        };

        let mut rows = Vec::new();
        for daemon in daemons {
            let endpoint = daemon
                .endpoint()
                .with_context(|| format!("cannot resolve endpoint for '{}'", daemon.name))?;
            let target = match &endpoint.addr {
                EndpointAddr::Unix { path } => path.display().to_string(),
                EndpointAddr::Inet { host, port } => format!("{host}:{port}"),
            };
            rows.push(EndpointRow {
                daemon: daemon.name.clone(),
                kind: endpoint.addr.kind().to_string(),
                target,
                server_url: endpoint.addr.server_url(),
                auth: endpoint.credentials.is_some(),
                ambiguous: is_ambiguous_path(&endpoint.addr),
            });
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize endpoint JSON")?
            );
            return Ok(());
        }

        let warn = rows.iter().any(|r| r.ambiguous);
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        if warn {
            println!(
                "{} some listen values are relative paths and were taken as unix sockets",
                "!".yellow().bold()
            );
        }
        Ok(())
    }
}

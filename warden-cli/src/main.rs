//! Warden — declare supervisor state, render its config, reconcile the daemon.
//!
//! # Usage
//!
//! ```text
//! warden check <manifest>
//! warden render <manifest> [--daemon <name>] [--entity <kind>:<name>]
//! warden endpoint <manifest> [--daemon <name>] [--json]
//! warden diff <manifest>
//! warden plan <manifest> [--json]
//! warden apply <manifest> [--dry-run] [--skip-daemon] [--json]
//! warden ctl <manifest> <action> <kind> <name> [--daemon <name>] [--dry-run]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::{ApplyArgs, PlanArgs},
    check::CheckArgs,
    ctl::CtlArgs,
    diff::DiffArgs,
    endpoint::EndpointArgs,
    render::RenderArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Render supervisor configuration from a manifest and reconcile the running daemon",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a manifest.
    Check(CheckArgs),

    /// Print rendered configuration artifacts.
    Render(RenderArgs),

    /// Show the resolved control endpoint for each daemon.
    Endpoint(EndpointArgs),

    /// Show unified diff of what apply would write.
    Diff(DiffArgs),

    /// Dry-run apply, printed as a table.
    Plan(PlanArgs),

    /// Write configuration and drive the daemon to the declared state.
    Apply(ApplyArgs),

    /// Run a single action against one daemon, group or program.
    Ctl(CtlArgs),
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Check(args) => args.run(),
        Commands::Render(args) => args.run(),
        Commands::Endpoint(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Apply(args) => args.run(),
        Commands::Ctl(args) => args.run(),
    }
}

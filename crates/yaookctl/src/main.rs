//! yaookctl - recovery CLI for Yaook clusters.
//!
//! Inspects and forcibly repairs Galera and OVSDB StatefulSets and per-node
//! agents that the Yaook operators cannot bring back on their own.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use yaookctl::{ui, CtlConfig, RecoveryError};

mod commands;

use commands::force_upgrade::ForceUpgradeCommand;
use commands::galera::GaleraCommand;
use commands::ovsdb::OvsdbCommand;
use commands::pause::{PauseCommand, UnpauseCommand};

/// Recovery tooling for Yaook-managed clusters.
#[derive(Parser)]
#[command(
    name = "yaookctl",
    version,
    about = "Recovery tooling for Yaook-managed clusters",
    long_about = "Recover Yaook-managed services the operators cannot repair themselves.\n\n\
                  Most commands here are destructive and ask for confirmation first.\n\
                  Pause the affected Yaook resource before touching its StatefulSet."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Namespace of the Yaook resources.
    #[arg(short, long, global = true, env = "YAOOK_OP_NAMESPACE")]
    namespace: Option<String>,

    /// Kubeconfig context to use.
    #[arg(short, long, global = true, env = "YAOOK_KUBE_CONTEXT")]
    context: Option<String>,

    /// Do not ask for confirmation before destructive operations.
    #[arg(long, global = true)]
    yes_i_mean_it: bool,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Force the upgrade of a stateful Yaook agent.
    ForceUpgrade(ForceUpgradeCommand),

    /// Add the pause annotation to a resource.
    ///
    /// Supports the MySQL and OVSDB services and the per-node agents
    /// (compute, l2, l3, dhcp, bgp); other Yaook kinds are rejected.
    Pause(PauseCommand),

    /// Remove the pause annotation from a resource.
    ///
    /// Accepts the same kinds as `pause`.
    Unpause(UnpauseCommand),

    /// Utilities to work with Galera clusters.
    #[command(subcommand)]
    Galera(GaleraCommand),

    /// Utilities to work with OVSDB clusters.
    #[command(subcommand)]
    Ovsdb(OvsdbCommand),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,yaookctl=debug,kube=info")
        } else {
            EnvFilter::new("warn,yaookctl=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let (config, client) = CtlConfig::connect(cli.namespace, cli.context, cli.yes_i_mean_it).await?;
    debug!(namespace = %config.namespace, "configuration loaded");

    match cli.command {
        Commands::ForceUpgrade(cmd) => cmd.run(&config, client).await,
        Commands::Pause(cmd) => cmd.run(&config, client).await,
        Commands::Unpause(cmd) => cmd.run(&config, client).await,
        Commands::Galera(cmd) => cmd.run(&config, client).await,
        Commands::Ovsdb(cmd) => cmd.run(&config, client).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<RecoveryError>() {
                Some(recovery) => {
                    ui::print_error(&recovery.to_string());
                    if let Some(hint) = recovery.hint() {
                        ui::print_hint(hint);
                    }
                    recovery.exit_code()
                }
                None => {
                    ui::print_error(&format!("{err:#}"));
                    1
                }
            };
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

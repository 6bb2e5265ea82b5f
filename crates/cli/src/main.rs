//! sqlscaler CLI
//!
//! A command-line tool for analyzing managed database instances, planning
//! and applying tier changes, and browsing the machine-type catalog.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, machine_types, plan};
use scaler_lib::config::Profile;
use scaler_lib::shutdown::shutdown_channel;
use tracing_subscriber::EnvFilter;

/// Vertical autoscaler for managed database instances
#[derive(Parser)]
#[command(name = "sqlscaler")]
#[command(author, version, about = "Vertical autoscaler for managed database instances", long_about = None)]
pub struct Cli {
    /// Project to analyze (falls back to the config file, then GOOGLE_CLOUD_PROJECT)
    #[arg(long, global = true, env = "SCALER_PROJECT_ID")]
    pub project: Option<String>,

    /// Threshold preset: default, conservative or aggressive
    #[arg(long, global = true)]
    pub profile: Option<Profile>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Static OAuth access token (uses the metadata server if not specified)
    #[arg(long, global = true, env = "SCALER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, global = true, hide = true, default_value = scaler_lib::cloud::SQLADMIN_BASE_URL)]
    pub sqladmin_url: String,

    #[arg(long, global = true, hide = true, default_value = scaler_lib::cloud::MONITORING_BASE_URL)]
    pub monitoring_url: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze instances and optionally apply the recommended tier changes
    Analyze {
        /// Instance to analyze; repeat for several (all instances if omitted)
        #[arg(long = "instance", short = 'i')]
        instances: Vec<String>,

        /// Apply recommended changes (otherwise only report them)
        #[arg(long)]
        apply: bool,

        /// Apply even when the change causes downtime
        #[arg(long, requires = "apply")]
        force: bool,
    },

    /// Show the priority-ordered scaling plan for the project
    Plan,

    /// Browse the machine-type catalog
    #[command(subcommand)]
    MachineTypes(MachineTypesCommands),
}

#[derive(Subcommand)]
pub enum MachineTypesCommands {
    /// List registered machine types
    List {
        /// Filter by family (f1, g1, n1, n2, e2, perf-optimized)
        #[arg(long)]
        family: Option<String>,
    },

    /// Show one machine type and its neighbors
    Show {
        /// Tier name, e.g. db-n1-standard-4 or db-custom-4-16384
        tier: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let succeeded = match &cli.command {
        Commands::MachineTypes(cmd) => {
            match cmd {
                MachineTypesCommands::List { family } => {
                    machine_types::list(family.as_deref(), cli.format)?;
                }
                MachineTypesCommands::Show { tier } => {
                    machine_types::show(tier, cli.format)?;
                }
            }
            true
        }
        Commands::Analyze {
            instances,
            apply,
            force,
        } => {
            let settings = config::CliConfig::load()?;
            let analyzer = client::build_analyzer(&cli, &settings, !*apply, *force)?;
            let (trigger, shutdown) = shutdown_channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.trigger();
                }
            });
            analyze::run(&analyzer, instances, *apply, &shutdown, cli.format).await?
        }
        Commands::Plan => {
            let settings = config::CliConfig::load()?;
            let analyzer = client::build_analyzer(&cli, &settings, true, false)?;
            let (_trigger, shutdown) = shutdown_channel();
            plan::run(&analyzer, &shutdown, cli.format).await?
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

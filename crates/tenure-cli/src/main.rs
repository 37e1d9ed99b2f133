mod alerts;
mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tenure",
    about = "Keep each member's tenure role in step with how long they have been in the community",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "TENURE_CONFIG", default_value = tenure_core::config::CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file (never overwrites)
    Init,

    /// Validate the config and show the tier table
    Check,

    /// Show which tier a tenure resolves to
    Resolve {
        /// Tenure in whole days
        #[arg(long)]
        days: u32,
    },

    /// Run the reconciler until SIGINT/SIGTERM
    Run {
        /// Discord bot token
        #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
        token: String,

        #[command(flatten)]
        gotify: alerts::GotifyArgs,
    },

    /// Check a running reconciler's health endpoint and alert when it is down
    Probe {
        #[arg(long, default_value = "http://localhost:8015/health")]
        url: String,

        #[command(flatten)]
        gotify: alerts::GotifyArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Probe { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&cli.config),
        Commands::Check => cmd::check::run(&cli.config, cli.json),
        Commands::Resolve { days } => cmd::resolve::run(&cli.config, days, cli.json),
        Commands::Run { token, gotify } => cmd::run::run(&cli.config, &token, gotify.sink()),
        Commands::Probe { url, gotify } => cmd::probe::run(&url, gotify.gotify(), cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

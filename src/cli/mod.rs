pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of the default location
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the control API
    Serve {
        /// Configuration profile to use
        #[arg(short, long)]
        profile: Option<String>,

        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one session task in the foreground
    Run {
        /// Audience key to screen discovered identities against
        #[arg(required = true)]
        audience: String,

        /// User whose stored cookies unlock the platform
        #[arg(short, long)]
        user: i64,

        /// Session duration in seconds, defaults to the configured value
        #[arg(short, long)]
        duration: Option<f64>,

        /// Keep running sessions with rests in between until stopped
        #[arg(long)]
        infinite: bool,

        /// CSV of extra explore targets
        #[arg(short, long)]
        targets: Option<PathBuf>,

        /// Identity the session acts as, excluded from harvesting
        #[arg(long)]
        acting: Option<String>,

        /// Seed for reproducible pacing decisions
        #[arg(long)]
        seed: Option<u64>,

        /// Configuration profile to use
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// List the configured audiences
    Audiences {
        /// Configuration profile to use
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { profile, bind } => {
            info!("Starting control API");
            commands::serve(profile, bind).await
        }
        Commands::Run {
            audience,
            user,
            duration,
            infinite,
            targets,
            acting,
            seed,
            profile,
        } => {
            info!("Running session for audience '{}'", audience);
            commands::run(audience, user, duration, infinite, targets, acting, seed, profile).await
        }
        Commands::Audiences { profile } => commands::audiences(profile).await,
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles().await
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name).await
            } else {
                info!("Showing current configuration");
                commands::show_config().await
            }
        }
    }
}

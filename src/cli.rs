//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// Persona Coordinator - persona summaries and chat for a local LLM
///
/// Keeps one cached identity summary per persona card, regenerates it only
/// when the card changes, and serves greeting and chat endpoints.
#[derive(Parser, Debug)]
#[command(name = "persona-coordinator")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build missing summaries, then serve the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_COORD_CONFIG")]
        config: Option<String>,

        /// Start serving without the blocking summary pass
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Make every persona summary fresh and exit
    Preflight {
        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_COORD_CONFIG")]
        config: Option<String>,

        /// How long to wait for the regeneration lock
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Lock polling interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Print the summary for one persona, generating it if needed
    Summary {
        /// Persona key, display name or label (first persona if omitted)
        persona: Option<String>,

        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_COORD_CONFIG")]
        config: Option<String>,
    },

    /// List personas with their labels and cache status
    Personas {
        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_COORD_CONFIG")]
        config: Option<String>,
    },

    /// Remove the regeneration lock left by a crashed process
    Unlock {
        /// Path to configuration file
        #[arg(short, long, env = "PERSONA_COORD_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

impl Commands {
    /// Config file path given to this command, if it takes one
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Commands::Serve { config, .. }
            | Commands::Preflight { config, .. }
            | Commands::Summary { config, .. }
            | Commands::Personas { config }
            | Commands::Unlock { config } => config.as_deref(),
            Commands::Version | Commands::Config { .. } => None,
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

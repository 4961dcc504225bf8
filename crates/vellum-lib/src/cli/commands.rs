use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vellum - Versioned, access-controlled content repository
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Configuration file (default: ~/.config/vellum/config.toml)
    #[arg(long, short, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Bootstrap the configured repositories in memory and print a sample tree
    ///
    /// Creates a folder tree with a versioned document in the first
    /// repository, then lists it with the effective ACL of every object.
    Demo {
        /// Repository to run in (default: the first configured one)
        #[arg(long, short)]
        repository: Option<String>,

        /// User running the demo
        #[arg(long, short, default_value = "admin")]
        user: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write the default configuration
    Init {
        /// Destination (default: the --config path)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

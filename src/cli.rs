//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Warehouse service gated by identity-provider bearer tokens
#[derive(Parser, Debug)]
#[command(name = "warehouse-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "WAREHOUSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "WAREHOUSE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "WAREHOUSE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "WAREHOUSE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "WAREHOUSE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the warehouse server (default)
    Serve,

    /// Verify a bearer token against the configured identity provider
    Verify {
        /// The raw token (without the `Bearer ` prefix)
        #[arg(long, env = "WAREHOUSE_TOKEN", hide_env_values = true)]
        token: String,

        /// Also require this permission
        #[arg(long)]
        permission: Option<String>,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

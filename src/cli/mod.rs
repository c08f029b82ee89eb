//! CLI command definitions for task-result-bridge.
//!
//! The main entry point is the `Cli` struct; `serve` is the default command.

use clap::{Parser, Subcommand};

/// Webhook bridging task results into CRM entity fields
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Address to bind (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Append-only diagnostic log file (overrides config)
    #[arg(long, global = true)]
    pub diagnostic_log: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the webhook server (default if no subcommand given)
    Serve,

    /// Show how a field code is normalized and which names are looked up
    Fields {
        /// Field code as configured in the automation, e.g. UF_CRM_5_1
        field_code: String,
    },
}

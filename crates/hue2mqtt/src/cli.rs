//! Clap derive structures for the `hue2mqtt` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// hue2mqtt -- bridge Philips Hue to MQTT
#[derive(Debug, Parser)]
#[command(
    name = "hue2mqtt",
    version,
    about = "Bridge Philips Hue bridges to an MQTT broker",
    long_about = "Mirrors every Hue bridge event onto MQTT topics and applies\n\
        commands published to `<prefix>/<resource>/<id>/set` back to the bridge.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "HUE2MQTT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format for listing commands
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, env = "HUE2MQTT_LOG_JSON", global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default)
    Table,
    /// Pretty-printed JSON
    Json,
    /// One identifier per line
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until interrupted
    Run,

    /// Query the discovery service for bridges on this network
    Discover,

    /// List the resource types commands can address
    Catalog,

    /// Validate the configuration without connecting
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Print the effective configuration with secrets masked
    #[arg(long)]
    pub print_config: bool,
}

//! Clap derive structures for the `htlink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// htlink -- poll and configure Heliotherm heat pumps
#[derive(Debug, Parser)]
#[command(
    name = "htlink",
    version,
    about = "Poll and configure Heliotherm heat pumps from the command line",
    long_about = "Talks to a Heliotherm-family heat pump over TCP (directly or through a\n\
        serial-over-TCP bridge): reads measurements and settings, watches them\n\
        on a schedule, and writes settings after explicit confirmation.",
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
    /// Heat pump profile to use
    #[arg(long, short = 'p', env = "HTLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Heat pump host or IP (overrides profile)
    #[arg(long, short = 'H', env = "HTLINK_HOST", global = true)]
    pub host: Option<String>,

    /// TCP port (overrides profile)
    #[arg(long, env = "HTLINK_PORT", global = true)]
    pub port: Option<u16>,

    /// Timeout per request in seconds (overrides profile)
    #[arg(long, env = "HTLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HTLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the parameter catalog
    #[command(alias = "ls")]
    Params(ParamsArgs),

    /// Run one polling cycle and print the snapshot
    #[command(alias = "r")]
    Read(ReadArgs),

    /// Poll on a schedule until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Write one setting after confirmation
    Write(WriteArgs),

    /// Read or set the heat pump clock
    Clock(ClockArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Catalog ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ParamsArgs {
    /// Only parameters of this query class (bulk, individual)
    #[arg(long)]
    pub class: Option<String>,

    /// Only parameters of this category (temperature, status, setpoint, ...)
    #[arg(long)]
    pub category: Option<String>,

    /// Only writable parameters
    #[arg(long)]
    pub writable: bool,
}

// ── Polling ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Parameters to read (comma-separated; default: profile selection)
    #[arg(value_delimiter = ',')]
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Parameters to poll (comma-separated; default: profile selection)
    #[arg(value_delimiter = ',')]
    pub params: Vec<String>,

    /// Scan interval, e.g. "30s" or "2m" (overrides profile)
    #[arg(long, short = 'i', value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Stop after this many snapshots
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

// ── Writes ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Parameter identifier (see `htlink params --writable`)
    pub param: String,

    /// New value: a number, on/off, or an option label such as "heating"
    pub value: String,
}

#[derive(Debug, Args)]
pub struct ClockArgs {
    #[command(subcommand)]
    pub command: ClockCommand,
}

#[derive(Debug, Subcommand)]
pub enum ClockCommand {
    /// Show the heat pump's date and time
    Get,

    /// Set the heat pump's date and time
    Set {
        /// Date and time, "YYYY-MM-DD HH:MM:SS" (default: now)
        #[arg(conflicts_with = "now")]
        datetime: Option<String>,

        /// Use the local time of this machine
        #[arg(long)]
        now: bool,
    },
}

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

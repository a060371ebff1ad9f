//! Clap derive structures for the `plugsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// plugsync -- keep a live view of your smart plugs
#[derive(Debug, Parser)]
#[command(
    name = "plugsync",
    version,
    about = "Track and switch smart plugs from the command line",
    long_about = "Runs the plugsync lifecycle manager against a cloud account:\n\
        discovers plugs, keeps their channel state and electricity readings\n\
        fresh, and switches channels on demand.",
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
    #[arg(long, env = "PLUGSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Device fixture backing the simulated account
    #[arg(long, short = 'f', env = "PLUGSYNC_FIXTURE", global = true)]
    pub fixture: Option<PathBuf>,

    /// Account username (overrides config)
    #[arg(long, short = 'u', env = "PLUGSYNC_USERNAME", global = true)]
    pub username: Option<String>,

    /// Per-call timeout, e.g. "5s" (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "PLUGSYNC_OUTPUT",
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

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
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
    /// Run the manager and stream entity changes until interrupted
    #[command(alias = "watch")]
    Run(RunArgs),

    /// List and inspect plugs
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// List the switch and sensor entities a host would create
    #[command(alias = "ent", alias = "e")]
    Entities(EntitiesArgs),

    /// Switch a plug channel on or off
    #[command(alias = "sw")]
    Switch(SwitchArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Stop after this long instead of waiting for Ctrl-C, e.g. "30s"
    #[arg(long)]
    pub duration: Option<humantime::Duration>,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List every known plug
    #[command(alias = "ls")]
    List,

    /// Show one plug in detail
    Get {
        /// Device id
        device: String,
    },
}

// ── Entities ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    /// Only entities of this device
    #[arg(long, short = 'd')]
    pub device: Option<String>,
}

// ── Switch ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SwitchArgs {
    /// Device id
    pub device: String,

    /// Target state
    pub state: SwitchState,

    /// Channel index (0 is the main outlet)
    #[arg(long, short = 'c', default_value_t = 0)]
    pub channel: u32,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SwitchState {
    On,
    Off,
    Toggle,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a new config file from --username and --fixture
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store the account password in the system keyring (read from stdin)
    SetPassword,
}

#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::RelayConfig;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "landmark-relay")]
#[command(about = "Replay landmark ticks through a relay stage and send each snapshot over UDP")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: String,

    /// JSON lines file with one tick per line
    #[arg(short, long)]
    pub ticks: String,

    /// Override destination.address from config
    #[arg(long)]
    pub address: Option<String>,

    /// Override destination.port from config
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    /// Validate config and show the stage layout without sending anything
    #[arg(long)]
    pub dry_run: bool,
}

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "discord-automations")]
#[command(about = "Runs guild automations in response to Discord gateway events")]
#[command(version)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Apply database migrations and exit
    #[arg(long)]
    pub migrate_only: bool,
}

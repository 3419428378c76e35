use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "xemm")]
#[command(version = "0.1.0")]
#[command(about = "Cross-exchange market maker: quote on one venue, hedge on another", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine until Ctrl-C or the replay ends
    Run {
        /// Directory holding default.toml and environment overrides
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,
        /// JSON-lines market records to replay into the engine
        #[arg(long)]
        events: Option<PathBuf>,
        /// Force paper venues regardless of configuration
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate configuration, then exit
    CheckConfig {
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,
    },
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rigger")]
#[command(about = "AWS provisioning tasks for build pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long)]
    pub region: Option<String>,

    /// Only use for testing or throwaway accounts; normally credentials come
    /// from the SDK default chain.
    #[arg(long)]
    pub access_key_id: Option<String>,

    #[arg(long)]
    pub secret_access_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a pipeline file.
    Run {
        #[arg(long)]
        file: PathBuf,
    },
    /// Parse and validate a pipeline file without executing it.
    Validate {
        #[arg(long)]
        file: PathBuf,
    },
}

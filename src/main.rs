use anyhow::Result;
use clap::Parser;
use tracing::info;

use rigger::aws::AwsSettings;
use rigger::cli::{Cli, Commands};
use rigger::pipeline::runner::Runner;
use rigger::pipeline::Pipeline;
use rigger::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = telemetry::init_telemetry() {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let cli = Cli::parse();
    let settings = AwsSettings {
        access_key_id: cli.access_key_id.clone(),
        secret_access_key: cli.secret_access_key.clone(),
        region: cli.region.clone(),
    };

    let result = match &cli.command {
        Commands::Run { file } => {
            let pipeline = Pipeline::load(file)?;
            Runner::new(settings).run(&pipeline).await
        }
        Commands::Validate { file } => {
            let pipeline = Pipeline::load(file)?;
            Runner::new(settings).validate(&pipeline)?;
            info!("pipeline OK, {} tasks", pipeline.tasks.len());
            Ok(())
        }
    };

    telemetry::shutdown_telemetry();
    result
}

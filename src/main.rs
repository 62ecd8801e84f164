use std::{path::PathBuf, process::exit, time::Instant};

use anyhow::Result;
use clap::Parser;
use multiversion_task_generator::{
    ConfigOptions, Dependencies, EvgAuth, GenerationOutcome, MultiversionGenerator,
};
use tracing::{event, Level};
use tracing_subscriber::fmt::format;

const DEFAULT_EVG_CONFIG: &str = "~/.evergreen.yml";

/// Create a configuration for generated tasks running a resmoke suite in mixed version clusters.
///
/// Suites using a replica set are run with 3 nodes and linear_chain=True. Suites using a
/// sharded cluster are run with 2 shards of 2 nodes each.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Location of expansions file generated by evergreen.
    #[arg(long)]
    expansion_file: PathBuf,

    /// Location of evergreen configuration file.
    #[arg(long, default_value = DEFAULT_EVG_CONFIG)]
    evergreen_config: String,
}

/// Configure logging for the command execution.
fn configure_logging() -> Result<()> {
    let format = format::json();
    let subscriber = tracing_subscriber::fmt().event_format(format).finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn generate(args: &Args) -> Result<GenerationOutcome> {
    let options = ConfigOptions::from_yaml_file(&args.expansion_file)?;
    let evg_config = PathBuf::from(shellexpand::tilde(&args.evergreen_config).to_string());
    let evg_auth = EvgAuth::from_yaml_file(&evg_config)?;

    let deps = Dependencies::new(&options, evg_auth);
    MultiversionGenerator::new(deps, options).run().await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = configure_logging() {
        eprintln!("Could not configure logging: {:?}", err);
        exit(1);
    }

    let start = Instant::now();
    let result = generate(&args).await;
    event!(
        Level::INFO,
        duration_secs = start.elapsed().as_secs_f64(),
        "generation completed"
    );
    match result {
        Ok(outcome) => event!(Level::INFO, outcome = ?outcome, "Finished"),
        Err(err) => {
            eprintln!("Error encountered during execution: {:?}", err);
            exit(1);
        }
    }
}

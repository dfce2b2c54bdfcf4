use std::{path::PathBuf, process::ExitCode};

use addrcount::{
    config::{Config, ConfigLayer},
    enrich,
    store::MongoStore,
    EnrichError,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Append per-address document counts from MongoDB to a CSV file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YAML file with any of the options below; flags take precedence
    #[arg(long, env = "ADDRCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// MongoDB connection string
    #[arg(long, env = "ADDRCOUNT_ENDPOINT", hide_env_values = true)]
    endpoint: Option<String>,

    #[arg(long, env = "ADDRCOUNT_DATABASE")]
    database: Option<String>,

    #[arg(long, env = "ADDRCOUNT_COLLECTION")]
    collection: Option<String>,

    /// Input CSV [default: input.csv]
    #[arg(long, env = "ADDRCOUNT_INPUT")]
    input: Option<PathBuf>,

    /// Output CSV [default: output.csv]
    #[arg(long, env = "ADDRCOUNT_OUTPUT")]
    output: Option<PathBuf>,

    /// Keep rows whose type column equals this, ignoring case [default: NFT_COLLECTION]
    #[arg(long, env = "ADDRCOUNT_TYPE_FILTER")]
    type_filter: Option<String>,

    /// Give up on a single count query after this many seconds
    #[arg(long, env = "ADDRCOUNT_QUERY_TIMEOUT_SECS")]
    query_timeout_secs: Option<u64>,
}

impl Args {
    fn layer(&self) -> ConfigLayer {
        ConfigLayer {
            endpoint: self.endpoint.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            type_filter_value: self.type_filter.clone(),
            query_timeout_secs: self.query_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<EnrichError>()
                .map(EnrichError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // ─── 2) resolve config: file < flags/env < defaults ──────────────
    let file_layer = match &args.config {
        Some(path) => ConfigLayer::load(path)?,
        None => ConfigLayer::default(),
    };
    let config = Config::resolve(file_layer.merge(args.layer()))?;
    info!(
        input = %config.input_path.display(),
        output = %config.output_path.display(),
        type_filter = %config.type_filter_value,
        "startup"
    );

    // ─── 3) connect, enrich, always disconnect ───────────────────────
    let store = MongoStore::connect(&config.store).await?;
    let outcome = enrich::run(&config, &store).await;
    store.shutdown().await;

    outcome.context("enrichment aborted")?;
    Ok(())
}

use anyhow::{Context, Result};
use catalog_gateway_aggregator::{CatalogService, KeyValueStore, MetricsRecorder, RedisStore};
use catalog_gateway_core::{init_logging, load_dotenv, ConfigLoader, GatewayConfig, LoggingConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;

mod commands;

#[derive(Parser)]
#[command(name = "catalog-admin")]
#[command(about = "Cache and metrics administration for the catalog gateway", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        env = "REDIS_URL",
        help = "Redis connection URL (overrides CATALOG_GATEWAY_REDIS_URL)"
    )]
    redis_url: Option<String>,

    #[arg(short, long, global = true, help = "Show gateway logs on stderr")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Build the hero banner and every lane set into the cache")]
    Warm {
        #[arg(long, help = "Drop the cached entries before rebuilding")]
        force: bool,
    },

    #[command(about = "Show the analytics snapshot")]
    Stats {
        #[arg(long, help = "Statistics for a single endpoint path instead")]
        path: Option<String>,
    },

    #[command(about = "Drop cached entries of a data set")]
    Invalidate {
        #[arg(help = "Data set name (hero, movies, tv, latest, featured, category, filtered, detail, search, tags) or 'all'")]
        target: String,

        #[arg(long, help = "Only the detail page of this subject (with 'detail')")]
        id: Option<String>,
    },

    #[command(about = "Delete every recorded metric")]
    ResetMetrics,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    load_dotenv();

    let cli = Cli::parse();

    if cli.verbose {
        init_logging(&LoggingConfig {
            service_name: "catalog-admin".to_string(),
            ..LoggingConfig::from_env()
        })?;
    }

    let mut config = GatewayConfig::from_env().context("Invalid gateway configuration")?;
    if let Some(url) = cli.redis_url {
        config.redis.url = url;
    }
    config.validate().context("Invalid gateway configuration")?;

    let store: Arc<dyn KeyValueStore> = Arc::new(
        RedisStore::connect(&config.redis)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", config.redis.url))?,
    );

    match cli.command {
        Commands::Warm { force } => {
            let catalog = CatalogService::from_config(&config, store)?;
            commands::warm(&catalog, force).await?;
        }
        Commands::Stats { path } => {
            let metrics = MetricsRecorder::new(store);
            commands::stats(&metrics, path.as_deref()).await?;
        }
        Commands::Invalidate { target, id } => {
            let catalog = CatalogService::from_config(&config, store)?;
            commands::invalidate(&catalog, &target, id.as_deref()).await?;
        }
        Commands::ResetMetrics => {
            let metrics = MetricsRecorder::new(store);
            commands::reset_metrics(&metrics).await?;
        }
    }

    Ok(())
}

//! ---
//! ps_section: "01-core-functionality"
//! ps_subsection: "binary"
//! ps_type: "source"
//! ps_scope: "code"
//! ps_description: "Binary entrypoint for the provsim daemon."
//! ps_version: "v0.1.0"
//! ps_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use provsim_common::config::AppConfig;
use provsim_common::logging::init_tracing;
use provsim_metrics::{new_registry, spawn_http_server, BridgeMetrics, EngineMetrics};
use provsim_provider::{BridgeOptions, ProviderRuntime, TracingPublisher};
use provsim_sim::ModelRegistry;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const JITTER_REPORT_FILE: &str = "provsim-jitter.json";

#[derive(Debug, Parser)]
#[command(author, version, about = "provsim daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Override the configured simulation model")]
    model: Option<String>,

    #[arg(long, help = "Log every provider request at debug level")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the simulation and provider until interrupted")]
    Run,
    #[command(about = "List the built-in simulation models")]
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let models = ModelRegistry::with_builtin();

    if let Some(Commands::Models) = cli.command {
        for name in models.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/provsim.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(model) = cli.model {
        config.simulation.model = model;
    }
    if cli.debug {
        config.provider.debug = true;
    }
    config.validate()?;

    init_tracing("provsimd", &config.logging)?;
    info!(config_path = %loaded.source.display(), model = %config.simulation.model, "configuration loaded");

    run_daemon(config, models).await
}

async fn run_daemon(config: AppConfig, models: ModelRegistry) -> Result<()> {
    let metrics_registry = config.metrics.enabled.then(new_registry);
    let metrics_server = match &metrics_registry {
        Some(registry) => {
            let server = spawn_http_server(registry.clone(), config.metrics.listen).await?;
            info!(address = %server.addr(), "metrics exporter enabled");
            Some(server)
        }
        None => {
            info!("metrics exporter disabled by configuration");
            None
        }
    };

    let mut engine = models
        .load_configured(&config.simulation)
        .context("simulation model failed to load")?;
    let mut options = BridgeOptions::from_config(&config.provider);
    if let Some(registry) = &metrics_registry {
        engine = engine.with_metrics(EngineMetrics::new(registry.clone())?);
        options = options.with_metrics(BridgeMetrics::new(registry.clone())?);
    }

    let runtime = ProviderRuntime::start(engine, Arc::new(TracingPublisher), options)
        .context("provider failed to start")?;
    let (shutdown_tx, _) = broadcast::channel(4);
    let publish_task = tokio::spawn(
        runtime
            .bridge()
            .publish_loop(config.provider.publish_interval, shutdown_tx.subscribe()),
    );

    info!(
        publish_interval_ms = config.provider.publish_interval.as_millis() as u64,
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    let _ = shutdown_tx.send(());
    if let Err(err) = publish_task.await {
        error!(error = %err, "publish task join error");
    }

    let report_path = config.logging.directory.join(JITTER_REPORT_FILE);
    let engine = runtime.engine().clone();
    tokio::task::spawn_blocking(move || runtime.shutdown())
        .await
        .context("simulation shutdown task failed")?;
    if let Err(err) = engine.timing().histogram().write_json(&report_path) {
        warn!(path = %report_path.display(), error = %err, "failed to write loop jitter report");
    } else {
        info!(path = %report_path.display(), "loop jitter report written");
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    info!("daemon shutdown complete");
    Ok(())
}

//! fireteam-relay - Harvests team-up posts and relays new ones downstream
//!
//! This is the main entry point for the fireteam-relay application.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use fireteam_relay::config::Config;
use fireteam_relay::error::AppError;
use fireteam_relay::logging::init_tracing;
use fireteam_relay::relay::{
    HarvestPipeline, PeriodicTask, ProxyPool, RelayHttpClient, Supervisor,
};
use fireteam_relay::stats::Counter;

/// fireteam-relay - Harvests team-up posts and relays new ones downstream
#[derive(Parser, Debug)]
#[command(name = "fireteam-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "FIRETEAM_RELAY_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    run(&args).await?;
    Ok(())
}

async fn run(args: &Args) -> Result<(), AppError> {
    let config = load_config(args)?;

    init_tracing(&config.logging.level, &config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %config.source.url,
        sink = %config.sink.url,
        "Starting fireteam-relay"
    );

    let engines = Engines::build(&config)?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let stats_handle = {
        let counter = Arc::clone(&engines.counter);
        let interval = Duration::from_secs(config.stats.interval_secs);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { counter.run(interval, shutdown_rx).await })
    };

    let supervisor_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            Supervisor::default()
                .run(move || engines.tasks(), shutdown_rx)
                .await
        })
    };

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match supervisor_handle.await {
        Ok(restarts) => info!(restarts, "Engines stopped"),
        Err(e) => error!(error = %e, "Supervisor task failed"),
    }
    if let Err(e) = stats_handle.await {
        error!(error = %e, "Stats task failed");
    }

    info!("fireteam-relay shutdown complete");
    Ok(())
}

/// Engines and their state, shared across supervisor restarts
struct Engines {
    counter: Arc<Counter>,
    pool: Arc<ProxyPool>,
    pipeline: Arc<HarvestPipeline>,
}

impl Engines {
    fn build(config: &Config) -> Result<Self, AppError> {
        let counter = Arc::new(Counter::new());
        let provider_http =
            RelayHttpClient::new(Duration::from_secs(config.http.timeout_secs), false)?;
        let pool = Arc::new(ProxyPool::new(&config.proxy, provider_http));
        let pipeline = Arc::new(HarvestPipeline::new(
            config,
            Arc::clone(&pool),
            Arc::clone(&counter),
        )?);

        Ok(Self {
            counter,
            pool,
            pipeline,
        })
    }

    fn tasks(&self) -> Vec<Arc<dyn PeriodicTask>> {
        vec![
            Arc::clone(&self.pool) as Arc<dyn PeriodicTask>,
            Arc::clone(&self.pipeline) as Arc<dyn PeriodicTask>,
        ]
    }
}

/// Load and validate configuration from file or environment
fn load_config(args: &Args) -> Result<Config, AppError> {
    let config = match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)?
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env()?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Resolve when Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

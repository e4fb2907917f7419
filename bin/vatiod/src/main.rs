//! ---
//! vatio_section: "01-core-functionality"
//! vatio_subsection: "binary"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Binary entrypoint for the vatio controller daemon."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;

use vatio_api::{spawn_api_server, ApiState};
use vatio_common::config::AppConfig;
use vatio_common::logging::init_tracing;

mod controller;

use controller::Controller;

#[derive(Debug, Parser)]
#[command(author, version, about = "vatio controller daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the controller daemon")]
    Run,
    #[command(about = "Validate configuration and exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/vatio.toml"));
    candidates.push(PathBuf::from("configs/vatio.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }

    if let Some(Commands::CheckConfig) = cli.command {
        match &loaded.source {
            Some(path) => println!("configuration valid: {}", path.display()),
            None => println!("no configuration file found; built-in defaults are valid"),
        }
        return Ok(());
    }

    init_tracing("vatiod", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let api_state = Arc::new(ApiState::new(&config));
    let controller = Arc::new(Controller::new(api_state.clone(), &config));
    controller.adopt_on_startup(Utc::now());

    let router = vatio_api::router(api_state).merge(controller::router(controller.clone()));
    let server = spawn_api_server(router, config.api.listen)?;

    let metering = spawn_interval_task(
        config.metering.tick_interval,
        controller.clone(),
        |controller| controller.metering_tick(Utc::now()),
    );
    let reconcile = spawn_interval_task(
        config.sync.reconcile_interval,
        controller,
        |controller| controller.reconcile_tick(),
    );

    info!(address = %server.addr(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    metering.abort();
    reconcile.abort();
    server.shutdown().await?;
    Ok(())
}

fn spawn_interval_task(
    period: Duration,
    controller: Arc<Controller>,
    tick: impl Fn(&Controller) + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would double-count the startup instant.
        interval.tick().await;
        loop {
            interval.tick().await;
            tick(&controller);
        }
    })
}

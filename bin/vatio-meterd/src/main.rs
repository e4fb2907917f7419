//! ---
//! vatio_section: "05-sensing-node"
//! vatio_subsection: "binary"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Binary entrypoint for the sensing-node daemon."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Runs the sensing loop against the controller API with a synthetic signal
//! source standing in for the transducer frontend. The loop is synchronous
//! and single-threaded by design, so this binary carries no async runtime.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use vatio_common::config::AppConfig;
use vatio_common::logging::init_tracing;
use vatio_meter::{HttpRelayEndpoint, HttpReportSink, MeterNode, SimulatedRelay};
use vatio_sim::SyntheticSignal;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(author, version, about = "vatio sensing-node daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "URL", help = "Override the controller API base URL")]
    api_url: Option<String>,

    #[arg(long, value_name = "TAG", help = "Equipment tag attached to reports")]
    equipment: Option<String>,

    #[arg(long, value_name = "SEED", help = "Override the synthetic signal seed")]
    seed: Option<u64>,

    #[arg(
        long,
        value_name = "AMPS",
        default_value_t = 0.0,
        help = "Simulated equipment load in RMS amperes"
    )]
    load_amps: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/vatio.toml"));
    candidates.push(PathBuf::from("configs/vatio.dev.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(api_url) = cli.api_url {
        config.node.api_url = api_url;
    }
    if let Some(equipment) = cli.equipment {
        config.node.equipment = Some(equipment);
    }
    init_tracing("vatio-meterd", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using defaults"),
    }

    let seed = cli.seed.unwrap_or(config.simulation.seed);
    let mut source = SyntheticSignal::new(seed);
    source.set_load_amps(cli.load_amps);

    let sink = HttpReportSink::new(&config.node.api_url, HTTP_TIMEOUT)
        .context("failed to build report sink")?;
    let relay = HttpRelayEndpoint::new(&config.node.api_url, HTTP_TIMEOUT)
        .context("failed to build relay endpoint")?;

    info!(
        api_url = %config.node.api_url,
        equipment = config.node.equipment.as_deref().unwrap_or(""),
        seed,
        load_amps = cli.load_amps,
        "sensing node starting"
    );
    let node = MeterNode::new(
        &config.node,
        source,
        sink,
        relay,
        SimulatedRelay::default(),
    );
    node.run()
}

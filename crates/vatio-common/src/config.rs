//! ---
//! vatio_section: "01-core-functionality"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Shared primitives and utilities for the meter runtime."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_sample_period() -> Duration {
    Duration::from_millis(1)
}

fn default_cycle_period() -> Duration {
    Duration::from_millis(20)
}

fn default_calibration_cycles() -> usize {
    100
}

fn default_report_cycles() -> usize {
    250
}

fn default_vibration_period() -> Duration {
    Duration::from_millis(50)
}

fn default_relay_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_api_url() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(7)
}

fn default_guard_period() -> Duration {
    Duration::from_secs(10)
}

fn default_idle_power_threshold_w() -> f64 {
    0.01
}

fn default_idle_confirm_ticks() -> u32 {
    3
}

fn default_mains_voltage_v() -> f64 {
    230.0
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_staleness_bound() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_command_expiry() -> Duration {
    Duration::from_secs(30)
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

fn default_reading_retention() -> usize {
    100
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_simulation_seed() -> u64 {
    0x5EED5u64
}

/// Primary configuration object for the Vatio runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub metering: MeteringConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "VATIO_CONFIG";

    /// Load configuration from disk, respecting the `VATIO_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path. When no
    /// candidate exists on disk the built-in defaults are returned, since
    /// every section of the meter configuration has a usable default.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.metering.validate()?;
        self.sync.validate()?;
        if self.api.reading_retention == 0 {
            return Err(anyhow!("api.reading_retention must be at least 1"));
        }
        Ok(())
    }
}

/// Sensing-node sampling and scheduling parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Raw current sample period (nominal 1 ms).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_sample_period", rename = "sample_period_ms")]
    pub sample_period: Duration,
    /// One AC period at 50 Hz; the cycle-RMS window.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_cycle_period", rename = "cycle_period_ms")]
    pub cycle_period: Duration,
    /// Cycle count of the one-shot DC-bias calibration window.
    #[serde(default = "default_calibration_cycles")]
    pub calibration_cycles: usize,
    /// Calibrated cycle values aggregated into one reported measurement.
    #[serde(default = "default_report_cycles")]
    pub report_cycles: usize,
    /// Vibration sample period (nominal 20 Hz).
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_vibration_period", rename = "vibration_period_ms")]
    pub vibration_period: Duration,
    /// How often the node polls the relay command slot.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_relay_poll_interval", rename = "relay_poll_interval_s")]
    pub relay_poll_interval: Duration,
    /// Equipment tag attached to every emitted measurement.
    #[serde(default)]
    pub equipment: Option<String>,
    /// Base URL of the ingestion/relay API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_period: default_sample_period(),
            cycle_period: default_cycle_period(),
            calibration_cycles: default_calibration_cycles(),
            report_cycles: default_report_cycles(),
            vibration_period: default_vibration_period(),
            relay_poll_interval: default_relay_poll_interval(),
            equipment: None,
            api_url: default_api_url(),
        }
    }
}

impl NodeConfig {
    fn validate(&self) -> Result<()> {
        if self.sample_period.is_zero() || self.cycle_period.is_zero() {
            return Err(anyhow!("node sample and cycle periods must be non-zero"));
        }
        if self.cycle_period < self.sample_period {
            return Err(anyhow!(
                "node.cycle_period_ms must be at least node.sample_period_ms"
            ));
        }
        if self.calibration_cycles == 0 || self.report_cycles == 0 {
            return Err(anyhow!(
                "node.calibration_cycles and node.report_cycles must be at least 1"
            ));
        }
        Ok(())
    }

    /// Raw samples folded into one cycle-RMS value.
    pub fn samples_per_cycle(&self) -> usize {
        (self.cycle_period.as_nanos() / self.sample_period.as_nanos()).max(1) as usize
    }
}

/// Session cost accumulation and automatic end-of-cycle detection knobs.
///
/// The idle threshold, confirm count, and guard period are tuned heuristics,
/// not physical constants, which is why they live in configuration.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteringConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_tick_interval", rename = "tick_interval_s")]
    pub tick_interval: Duration,
    /// Idle detection stays disarmed until this much session time elapsed.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_guard_period", rename = "guard_period_s")]
    pub guard_period: Duration,
    /// Power at or below this level counts toward the idle streak.
    #[serde(default = "default_idle_power_threshold_w")]
    pub idle_power_threshold_w: f64,
    /// Consecutive idle ticks required to auto-stop a session.
    #[serde(default = "default_idle_confirm_ticks")]
    pub idle_confirm_ticks: u32,
    #[serde(default = "default_mains_voltage_v")]
    pub mains_voltage_v: f64,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            guard_period: default_guard_period(),
            idle_power_threshold_w: default_idle_power_threshold_w(),
            idle_confirm_ticks: default_idle_confirm_ticks(),
            mains_voltage_v: default_mains_voltage_v(),
        }
    }
}

impl MeteringConfig {
    fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("metering.tick_interval_s must be non-zero"));
        }
        if self.idle_confirm_ticks == 0 {
            return Err(anyhow!("metering.idle_confirm_ticks must be at least 1"));
        }
        if !self.idle_power_threshold_w.is_finite() || self.idle_power_threshold_w < 0.0 {
            return Err(anyhow!(
                "metering.idle_power_threshold_w must be a non-negative number"
            ));
        }
        if !(self.mains_voltage_v.is_finite() && self.mains_voltage_v > 0.0) {
            return Err(anyhow!("metering.mains_voltage_v must be positive"));
        }
        Ok(())
    }
}

/// Cross-device reconciliation cadence and orphan cutoff.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_reconcile_interval", rename = "reconcile_interval_s")]
    pub reconcile_interval: Duration,
    /// Persisted "active" records older than this are treated as orphaned.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_staleness_bound", rename = "staleness_bound_s")]
    pub staleness_bound: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: default_reconcile_interval(),
            staleness_bound: default_staleness_bound(),
        }
    }
}

impl SyncConfig {
    fn validate(&self) -> Result<()> {
        if self.reconcile_interval.is_zero() || self.staleness_bound.is_zero() {
            return Err(anyhow!(
                "sync.reconcile_interval_s and sync.staleness_bound_s must be non-zero"
            ));
        }
        Ok(())
    }
}

/// Relay command slot behaviour.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// An unconsumed command older than this is dropped instead of delivered.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_command_expiry", rename = "command_expiry_s")]
    pub command_expiry: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command_expiry: default_command_expiry(),
        }
    }
}

/// REST API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// How many recent readings the in-memory log retains.
    #[serde(default = "default_reading_retention")]
    pub reading_retention: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
            reading_retention: default_reading_retention(),
        }
    }
}

/// Log sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Synthetic input generation settings for development and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_simulation_seed(),
        }
    }
}

//! ---
//! vatio_section: "01-core-functionality"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Shared primitives and utilities for the meter runtime."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Shared primitives for the Vatio smart-meter workspace.
//! This crate exposes configuration loading, logging setup, and time
//! helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    ApiConfig, AppConfig, LoggingConfig, MeteringConfig, NodeConfig, RelayConfig,
    SimulationConfig, SyncConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::hour_of;

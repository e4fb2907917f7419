//! ---
//! vatio_section: "07-simulation-test-harness"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Simulation helpers for signals and tariff schedules."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Seeded synthetic inputs: a mains-current/vibration signal source for the
//! sensing node and a simulated daily tariff schedule for environments
//! without an upstream price feed.

pub mod prices;
pub mod signal;

pub use prices::simulated_schedule;
pub use signal::SyntheticSignal;

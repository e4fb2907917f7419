//! ---
//! vatio_section: "02-signal-acquisition"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Signal-to-measurement pipeline for the sensing node."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Converts raw analog samples into periodic (current, vibration)
//! measurements: cycle-RMS estimation with a one-shot DC-bias calibration,
//! report-window averaging, and vibration peak-to-peak deviation tracking.

pub mod current;
pub mod vibration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use current::CurrentEstimator;
pub use vibration::VibrationTracker;

/// Source of raw transducer samples driving the acquisition loop. Hardware
/// ADC frontends and synthetic generators both sit behind this seam.
pub trait SignalSource {
    /// Next raw current-transducer sample, in amperes.
    fn current_sample(&mut self) -> f64;
    /// Next raw vibration sample, in sensor units.
    fn vibration_sample(&mut self) -> f64;
}

impl<S: SignalSource + ?Sized> SignalSource for &mut S {
    fn current_sample(&mut self) -> f64 {
        (**self).current_sample()
    }

    fn vibration_sample(&mut self) -> f64 {
        (**self).vibration_sample()
    }
}

/// One reported measurement, emitted once per report interval. Serializes
/// to the ingestion wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    /// Report-window mean of calibrated cycle-RMS current, in amperes.
    #[serde(rename = "current")]
    pub current_a: f64,
    /// Peak-to-peak vibration deviation over the report window. Absent
    /// until the vibration baseline calibrates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
}

//! ---
//! vatio_section: "02-signal-acquisition"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Signal-to-measurement pipeline for the sensing node."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use tracing::info;

use vatio_common::NodeConfig;

/// Tracks the peak-to-peak vibration deviation over a report window.
///
/// The first `calibration_samples` raw samples establish the resting
/// baseline (their arithmetic mean, captured once, like the current bias).
/// Afterwards each sample contributes `|sample - baseline|` to a running
/// min/max that [`VibrationTracker::take_peak_to_peak`] drains once per
/// report interval.
#[derive(Debug, Clone)]
pub struct VibrationTracker {
    calibration_samples: usize,
    baseline: Option<f64>,
    calibration_sum: f64,
    calibration_seen: usize,

    min_deviation: f64,
    max_deviation: f64,
    window_samples: usize,
}

impl VibrationTracker {
    pub fn new(calibration_samples: usize) -> Self {
        Self {
            calibration_samples: calibration_samples.max(1),
            baseline: None,
            calibration_sum: 0.0,
            calibration_seen: 0,
            min_deviation: f64::INFINITY,
            max_deviation: f64::NEG_INFINITY,
            window_samples: 0,
        }
    }

    /// Size the resting-baseline window to span the same wall-clock time as
    /// the current calibration window.
    pub fn from_config(config: &NodeConfig) -> Self {
        let window = config.cycle_period.as_nanos() * config.calibration_cycles as u128;
        let samples = (window / config.vibration_period.as_nanos().max(1)).max(1);
        Self::new(samples as usize)
    }

    pub fn push_sample(&mut self, sample: f64) {
        let baseline = match self.baseline {
            None => {
                self.calibration_sum += sample;
                self.calibration_seen += 1;
                if self.calibration_seen == self.calibration_samples {
                    let baseline = self.calibration_sum / self.calibration_samples as f64;
                    self.baseline = Some(baseline);
                    info!(
                        baseline = baseline,
                        samples = self.calibration_samples,
                        "vibration resting baseline calibrated"
                    );
                }
                return;
            }
            Some(baseline) => baseline,
        };

        let deviation = (sample - baseline).abs();
        self.min_deviation = self.min_deviation.min(deviation);
        self.max_deviation = self.max_deviation.max(deviation);
        self.window_samples += 1;
    }

    /// Drain the current window: returns the peak-to-peak deviation and
    /// resets min/max. `None` before calibration completes or when no sample
    /// landed in the window.
    pub fn take_peak_to_peak(&mut self) -> Option<f64> {
        if self.baseline.is_none() || self.window_samples == 0 {
            return None;
        }
        let peak_to_peak = self.max_deviation - self.min_deviation;
        self.min_deviation = f64::INFINITY;
        self.max_deviation = f64::NEG_INFINITY;
        self.window_samples = 0;
        Some(peak_to_peak)
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }
}

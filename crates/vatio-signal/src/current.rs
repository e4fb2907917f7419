//! ---
//! vatio_section: "02-signal-acquisition"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Signal-to-measurement pipeline for the sensing node."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use tracing::{debug, info};

use vatio_common::NodeConfig;

/// Cycle-RMS current estimator with a one-shot DC-bias calibration.
///
/// Raw samples are squared and accumulated; every `samples_per_cycle`
/// samples (one AC period) a cycle RMS is produced and the accumulator
/// reset. The first `calibration_cycles` cycle-RMS values form a running
/// mean used thereafter as the bias baseline. Recalibration never re-occurs
/// after this window; a meter that drifts needs a power cycle. Calibrated
/// cycle values are averaged over `report_cycles` and emitted as the
/// reported current, so nothing is emitted until calibration completes.
#[derive(Debug, Clone)]
pub struct CurrentEstimator {
    samples_per_cycle: usize,
    calibration_cycles: usize,
    report_cycles: usize,

    square_sum: f64,
    sample_count: usize,

    baseline: Option<f64>,
    calibration_sum: f64,
    calibration_seen: usize,

    report_sum: f64,
    report_seen: usize,
    cycles_completed: u64,
}

impl CurrentEstimator {
    pub fn new(samples_per_cycle: usize, calibration_cycles: usize, report_cycles: usize) -> Self {
        Self {
            samples_per_cycle: samples_per_cycle.max(1),
            calibration_cycles: calibration_cycles.max(1),
            report_cycles: report_cycles.max(1),
            square_sum: 0.0,
            sample_count: 0,
            baseline: None,
            calibration_sum: 0.0,
            calibration_seen: 0,
            report_sum: 0.0,
            report_seen: 0,
            cycles_completed: 0,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            config.samples_per_cycle(),
            config.calibration_cycles,
            config.report_cycles,
        )
    }

    /// Push one raw transducer sample. Returns the report-window mean when a
    /// full report window of calibrated cycles has accumulated.
    pub fn push_sample(&mut self, sample: f64) -> Option<f64> {
        self.square_sum += sample * sample;
        self.sample_count += 1;
        if self.sample_count < self.samples_per_cycle {
            return None;
        }
        let rms = (self.square_sum / self.sample_count as f64).sqrt();
        self.square_sum = 0.0;
        self.sample_count = 0;
        self.push_cycle_rms(rms)
    }

    /// Feed one completed cycle-RMS value through calibration and the report
    /// aggregation stage. Exposed so tests and replay tooling can drive the
    /// estimator at cycle granularity.
    pub fn push_cycle_rms(&mut self, rms: f64) -> Option<f64> {
        self.cycles_completed += 1;

        let baseline = match self.baseline {
            None => {
                self.calibration_sum += rms;
                self.calibration_seen += 1;
                if self.calibration_seen == self.calibration_cycles {
                    let baseline = self.calibration_sum / self.calibration_cycles as f64;
                    self.baseline = Some(baseline);
                    info!(
                        baseline_a = baseline,
                        cycles = self.calibration_cycles,
                        "current bias calibration complete"
                    );
                }
                return None;
            }
            Some(baseline) => baseline,
        };

        // Negative excursions below the bias baseline clamp to zero.
        let calibrated = (rms - baseline).max(0.0);
        self.report_sum += calibrated;
        self.report_seen += 1;
        if self.report_seen < self.report_cycles {
            return None;
        }

        let mean = self.report_sum / self.report_cycles as f64;
        self.report_sum = 0.0;
        self.report_seen = 0;
        debug!(current_a = mean, cycle = self.cycles_completed, "report window complete");
        Some(mean)
    }

    /// Whether the initial calibration window has completed.
    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// The DC-bias baseline, once calibrated.
    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    /// Total cycles folded so far, calibration window included.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }
}

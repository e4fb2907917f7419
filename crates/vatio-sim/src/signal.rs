//! ---
//! vatio_section: "07-simulation-test-harness"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Simulation helpers for signals and tariff schedules."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use std::f64::consts::PI;

use rand::prelude::*;
use rand_distr::Normal;

use vatio_signal::SignalSource;

const MAINS_HZ: f64 = 50.0;
const SAMPLE_PERIOD_S: f64 = 0.001;
const VIBRATION_RESTING: f64 = 0.5;

/// Deterministic synthetic transducer: a 50 Hz current waveform under a
/// switchable load, plus a vibration channel that shakes while the load
/// draws.
#[derive(Debug)]
pub struct SyntheticSignal {
    rng: StdRng,
    noise: Normal<f64>,
    sample_index: u64,
    load_amps: f64,
    bias: f64,
}

impl SyntheticSignal {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, 0.002).expect("sigma must be positive"),
            sample_index: 0,
            load_amps: 0.0,
            bias: 0.05,
        }
    }

    /// RMS amperes the simulated equipment draws; zero switches it off.
    pub fn set_load_amps(&mut self, amps: f64) {
        self.load_amps = amps.max(0.0);
    }

    pub fn load_amps(&self) -> f64 {
        self.load_amps
    }

    fn noise_sample(&mut self) -> f64 {
        self.noise.sample(&mut self.rng)
    }
}

impl SignalSource for SyntheticSignal {
    fn current_sample(&mut self) -> f64 {
        let t = self.sample_index as f64 * SAMPLE_PERIOD_S;
        self.sample_index += 1;
        let amplitude = self.load_amps * std::f64::consts::SQRT_2;
        amplitude * (2.0 * PI * MAINS_HZ * t).sin() + self.bias + self.noise_sample()
    }

    fn vibration_sample(&mut self) -> f64 {
        let t = self.sample_index as f64 * SAMPLE_PERIOD_S;
        let mechanical = if self.load_amps > 0.0 {
            0.3 * (2.0 * PI * 12.0 * t).sin()
        } else {
            0.0
        };
        VIBRATION_RESTING + mechanical + self.noise_sample() * 0.5
    }
}

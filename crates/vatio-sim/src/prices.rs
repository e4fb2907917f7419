//! ---
//! vatio_section: "07-simulation-test-harness"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Simulation helpers for signals and tariff schedules."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use chrono::{Datelike, NaiveDate};
use rand::prelude::*;

use vatio_session::{PricePeriod, PriceSchedule};

const BASE_PRICE: f64 = 0.12;

/// Generate a simulated 24-hour tariff for `date`.
///
/// The seed is mixed with the date so repeated queries for the same day
/// agree (the metering formula needs stable prices within a run) while
/// different days still vary. Band variation mirrors the upstream feed:
/// off-peak hours dip below base, peak hours ride above it.
pub fn simulated_schedule(date: NaiveDate, seed: u64) -> PriceSchedule {
    let mut rng = StdRng::seed_from_u64(seed ^ date.num_days_from_ce() as u64);
    let mut prices = [0.0_f64; 24];
    for (hour, price) in prices.iter_mut().enumerate() {
        let variation = match PricePeriod::classify(hour as u32) {
            PricePeriod::OffPeak => rng.gen_range(-0.03..0.01),
            PricePeriod::Peak => rng.gen_range(0.02..0.06),
            PricePeriod::Standard => rng.gen_range(-0.01..0.02),
        };
        *price = ((BASE_PRICE + variation) * 1000.0).round() / 1000.0;
    }
    PriceSchedule::from_prices(date, prices)
}

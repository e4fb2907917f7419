//! ---
//! vatio_section: "04-session-metering"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Session cost accumulation and end-of-cycle detection."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coarse tariff classification by time of day. Serialized with the Spanish
/// tariff band names the upstream price feed uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricePeriod {
    #[serde(rename = "valle")]
    OffPeak,
    #[serde(rename = "llano")]
    Standard,
    #[serde(rename = "punta")]
    Peak,
}

impl PricePeriod {
    /// Band an hour of day: 00-08 off-peak, 10-14 and 18-22 peak,
    /// everything else standard.
    pub fn classify(hour: u32) -> Self {
        match hour {
            0..=7 => PricePeriod::OffPeak,
            10..=13 | 18..=21 => PricePeriod::Peak,
            _ => PricePeriod::Standard,
        }
    }
}

/// One hour of the daily tariff, price in currency per kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrice {
    pub hour: u32,
    pub price: f64,
    pub date: NaiveDate,
    pub period: PricePeriod,
}

/// Read-only 24-hour tariff for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSchedule {
    pub date: NaiveDate,
    pub hours: Vec<HourlyPrice>,
}

impl PriceSchedule {
    /// Build a schedule from 24 hourly prices, banding each hour.
    pub fn from_prices(date: NaiveDate, prices: [f64; 24]) -> Self {
        let hours = prices
            .iter()
            .enumerate()
            .map(|(hour, price)| HourlyPrice {
                hour: hour as u32,
                price: *price,
                date,
                period: PricePeriod::classify(hour as u32),
            })
            .collect();
        Self { date, hours }
    }
}

/// Hourly price lookup consumed by the cost accumulator. The schedule is an
/// external collaborator; the accumulator only ever reads it.
pub trait PriceLookup {
    fn price_at(&self, hour: u32) -> f64;
}

impl PriceLookup for PriceSchedule {
    fn price_at(&self, hour: u32) -> f64 {
        self.hours
            .iter()
            .find(|entry| entry.hour == hour % 24)
            .map(|entry| entry.price)
            .unwrap_or(0.0)
    }
}

/// Constant tariff, used by tests and as a degraded fallback.
#[derive(Debug, Clone, Copy)]
pub struct FlatPrice(pub f64);

impl PriceLookup for FlatPrice {
    fn price_at(&self, _hour: u32) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_tariff_bands() {
        assert_eq!(PricePeriod::classify(0), PricePeriod::OffPeak);
        assert_eq!(PricePeriod::classify(7), PricePeriod::OffPeak);
        assert_eq!(PricePeriod::classify(8), PricePeriod::Standard);
        assert_eq!(PricePeriod::classify(10), PricePeriod::Peak);
        assert_eq!(PricePeriod::classify(13), PricePeriod::Peak);
        assert_eq!(PricePeriod::classify(14), PricePeriod::Standard);
        assert_eq!(PricePeriod::classify(18), PricePeriod::Peak);
        assert_eq!(PricePeriod::classify(21), PricePeriod::Peak);
        assert_eq!(PricePeriod::classify(22), PricePeriod::Standard);
        assert_eq!(PricePeriod::classify(23), PricePeriod::Standard);
    }

    #[test]
    fn schedule_lookup_wraps_hours() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let mut prices = [0.10; 24];
        prices[3] = 0.05;
        let schedule = PriceSchedule::from_prices(date, prices);
        assert_eq!(schedule.price_at(3), 0.05);
        assert_eq!(schedule.price_at(27), 0.05);
        assert_eq!(schedule.hours.len(), 24);
    }

    #[test]
    fn period_serializes_with_tariff_names() {
        let json = serde_json::to_string(&PricePeriod::Peak).unwrap();
        assert_eq!(json, "\"punta\"");
    }
}

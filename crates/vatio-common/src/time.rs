//! ---
//! vatio_section: "01-core-functionality"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Shared primitives and utilities for the meter runtime."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};

/// Hour-of-day (0..=23) used to index the tariff schedule.
pub fn hour_of(timestamp: DateTime<Utc>) -> u32 {
    timestamp.hour()
}

/// Wall-clock age of `since` at `now`, saturating to zero for clock skew.
pub fn age(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

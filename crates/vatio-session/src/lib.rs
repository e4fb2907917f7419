//! ---
//! vatio_section: "04-session-metering"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Session cost accumulation and end-of-cycle detection."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Session metering: integrates power into energy and cost over an active
//! usage session and detects its natural end from a sustained near-zero
//! power streak.

pub mod accumulator;
pub mod model;
pub mod prices;

pub use accumulator::{CostAccumulator, TickOutcome};
pub use model::{ActiveSession, CompletedSession};
pub use prices::{FlatPrice, HourlyPrice, PriceLookup, PricePeriod, PriceSchedule};

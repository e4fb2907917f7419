//! ---
//! vatio_section: "04-session-metering"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Session cost accumulation and end-of-cycle detection."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A running cost-tracked usage period. Its existence is the `is_active`
/// flag of the data model: at most one active session exists system-wide,
/// and `total_cost` only ever grows while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    pub total_cost: f64,
}

impl ActiveSession {
    pub fn new(start_time: DateTime<Utc>, equipment: Option<String>) -> Self {
        Self {
            start_time,
            equipment,
            total_cost: 0.0,
        }
    }
}

/// A finalized session. Produced by manual stop or automatic end-of-cycle
/// detection; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    pub total_cost: f64,
}

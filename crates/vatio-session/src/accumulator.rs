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
use tracing::{debug, info};

use vatio_common::time::hour_of;
use vatio_common::MeteringConfig;

use crate::model::{ActiveSession, CompletedSession};
use crate::prices::PriceLookup;

/// Result of one accumulator tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No session is running; the tick was a no-op.
    Inactive,
    /// Cost accrued; the session keeps running.
    Accrued { cost_increment: f64 },
    /// The low-power streak reached its confirmation count on this tick and
    /// the session was finalized.
    AutoStopped(CompletedSession),
}

/// Integrates power into energy and cost over the active session.
///
/// Each tick applies rectangular integration over the tick period using
/// only the latest power sample. That is a deliberate simplification, not a
/// true time integral; changing it changes every metered total.
#[derive(Debug, Clone)]
pub struct CostAccumulator {
    config: MeteringConfig,
    session: Option<ActiveSession>,
    idle_streak: u32,
    last_completed: Option<CompletedSession>,
}

impl CostAccumulator {
    pub fn new(config: MeteringConfig) -> Self {
        Self {
            config,
            session: None,
            idle_streak: 0,
            last_completed: None,
        }
    }

    pub fn config(&self) -> &MeteringConfig {
        &self.config
    }

    /// Begin a session, replacing any running one.
    pub fn start(&mut self, now: DateTime<Utc>, equipment: Option<String>) {
        if let Some(previous) = &self.session {
            info!(start_time = %previous.start_time, "replacing running session");
        }
        info!(equipment = equipment.as_deref().unwrap_or(""), "session started");
        self.session = Some(ActiveSession::new(now, equipment));
        self.idle_streak = 0;
    }

    /// Adopt a foreign session wholesale (startup reconciliation only).
    pub fn adopt(&mut self, session: ActiveSession) {
        info!(
            start_time = %session.start_time,
            total_cost = session.total_cost,
            equipment = session.equipment.as_deref().unwrap_or(""),
            "adopted shared session"
        );
        self.session = Some(session);
        self.idle_streak = 0;
    }

    /// Discard the local session without finalizing it (orphan cleanup).
    pub fn clear(&mut self) {
        if self.session.take().is_some() {
            debug!("local session cache cleared");
        }
        self.idle_streak = 0;
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    /// Snapshot of the most recently finalized session, kept for display
    /// until superseded by the next one.
    pub fn last_completed(&self) -> Option<&CompletedSession> {
        self.last_completed.as_ref()
    }

    /// Raise the running total to `cost` if it is higher (max-merge input
    /// from the shared store; totals are monotone so max is safe).
    pub fn raise_total_cost(&mut self, cost: f64) {
        if let Some(session) = &mut self.session {
            if cost > session.total_cost {
                debug!(from = session.total_cost, to = cost, "total cost raised from shared store");
                session.total_cost = cost;
            }
        }
    }

    /// Derive instantaneous power from an RMS current reading.
    pub fn power_from_current(&self, current_a: f64) -> f64 {
        current_a * self.config.mains_voltage_v
    }

    /// One metering tick with the latest power sample.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        latest_power_w: f64,
        prices: &dyn PriceLookup,
    ) -> TickOutcome {
        let Some(session) = &mut self.session else {
            return TickOutcome::Inactive;
        };

        let tick_seconds = self.config.tick_interval.as_secs_f64();
        let energy_kwh = latest_power_w * tick_seconds / 3600.0 / 1000.0;
        let price = prices.price_at(hour_of(now));
        let cost_increment = energy_kwh * price;
        session.total_cost += cost_increment;
        debug!(
            power_w = latest_power_w,
            price_per_kwh = price,
            cost_increment,
            total_cost = session.total_cost,
            "metering tick"
        );

        // Idle detection stays disarmed until the guard period has elapsed,
        // so switch-on transients cannot end a session that just began.
        let elapsed = now - session.start_time;
        let armed = elapsed.to_std().unwrap_or_default() > self.config.guard_period;
        if armed && latest_power_w <= self.config.idle_power_threshold_w {
            self.idle_streak += 1;
            debug!(streak = self.idle_streak, "low-power tick");
            if self.idle_streak >= self.config.idle_confirm_ticks {
                if let Some(completed) = self.finalize(now) {
                    info!(
                        total_cost = completed.total_cost,
                        "session auto-stopped after sustained idle power"
                    );
                    return TickOutcome::AutoStopped(completed);
                }
            }
        } else {
            self.idle_streak = 0;
        }

        TickOutcome::Accrued { cost_increment }
    }

    /// Manual stop. Finalizes identically to automatic detection regardless
    /// of streak state; idempotent: a second stop returns `None`.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<CompletedSession> {
        let completed = self.finalize(now)?;
        info!(total_cost = completed.total_cost, "session stopped");
        Some(completed)
    }

    fn finalize(&mut self, now: DateTime<Utc>) -> Option<CompletedSession> {
        let session = self.session.take()?;
        self.idle_streak = 0;
        let completed = CompletedSession {
            start_time: session.start_time,
            end_time: now,
            equipment: session.equipment,
            total_cost: session.total_cost,
        };
        self.last_completed = Some(completed.clone());
        Some(completed)
    }
}

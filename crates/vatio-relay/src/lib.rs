//! ---
//! vatio_section: "03-relay-control"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "One-slot relay command protocol shared between controller and node."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! The relay command channel is a single shared mutable slot: a controller
//! writes a desired state, the sensing node polls, actuates, and reports
//! back. The slot holds at most one unconsumed command; a newer write
//! overwrites an unconsumed older one, and a superseded command is never
//! redelivered. `last_status` is the only ground truth; the pending command
//! is intent, not state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info};

/// Relay contact state, also used as the command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelayState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy)]
struct PendingCommand {
    command: RelayState,
    issued_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SlotState {
    pending: Option<PendingCommand>,
    last_status: RelayState,
}

/// The singleton command slot.
#[derive(Debug)]
pub struct CommandSlot {
    state: Mutex<SlotState>,
    command_expiry: Duration,
}

impl CommandSlot {
    /// A pending command older than `command_expiry` at poll time is dropped
    /// instead of delivered; the controller's intent has gone stale.
    pub fn new(command_expiry: Duration) -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                last_status: RelayState::Off,
            }),
            command_expiry,
        }
    }

    /// Controller request. Unconditional overwrite: the last write before
    /// the next poll wins, there is no queue.
    pub fn request(&self, command: RelayState, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        if let Some(previous) = state.pending {
            debug!(superseded = %previous.command, command = %command, "relay command overwritten");
        }
        state.pending = Some(PendingCommand {
            command,
            issued_at: now,
        });
        info!(command = %command, "relay command requested");
    }

    /// Node poll. Atomically returns and clears the pending command;
    /// expired commands are discarded, not delivered.
    pub fn take(&self, now: DateTime<Utc>) -> Option<RelayState> {
        let mut state = self.state.lock();
        let pending = state.pending.take()?;
        let age = (now - pending.issued_at).to_std().unwrap_or(Duration::ZERO);
        if age > self.command_expiry {
            info!(command = %pending.command, age_s = age.as_secs(), "relay command expired unconsumed");
            return None;
        }
        Some(pending.command)
    }

    /// Device status report. Also clears a still-pending command that the
    /// report confirms, so a poll race cannot redeliver executed intent.
    pub fn report_status(&self, status: RelayState) {
        let mut state = self.state.lock();
        if state.pending.map(|p| p.command) == Some(status) {
            debug!(status = %status, "pending relay command confirmed by device report");
            state.pending = None;
        }
        if state.last_status != status {
            info!(from = %state.last_status, to = %status, "relay status updated");
        }
        state.last_status = status;
    }

    /// Ground-truth relay state as last reported by the device.
    pub fn last_status(&self) -> RelayState {
        self.state.lock().last_status
    }

    /// Non-consuming view for health/diagnostic surfaces. Consumers must
    /// never treat the pending half as relay state.
    pub fn peek(&self) -> (Option<RelayState>, RelayState) {
        let state = self.state.lock();
        (state.pending.map(|p| p.command), state.last_status)
    }
}

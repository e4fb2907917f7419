//! ---
//! vatio_section: "05-sensing-node"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Sensing-node runtime: acquisition loop, transport, relay actuation."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! Transport seams for the sensing node. Blocking HTTP is deliberate: the
//! acquisition loop is single-threaded and paced in milliseconds, so every
//! request carries a bounded timeout instead of an executor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vatio_relay::RelayState;
use vatio_signal::Measurement;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server rejected request with status {status}")]
    Rejected { status: u16 },
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Where finished measurement reports go.
pub trait ReportSink {
    fn submit(&mut self, measurement: &Measurement) -> Result<()>;
}

impl<T: ReportSink + ?Sized> ReportSink for &mut T {
    fn submit(&mut self, measurement: &Measurement) -> Result<()> {
        (**self).submit(measurement)
    }
}

/// Relay slot view returned by one poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelayPoll {
    pub command: Option<RelayState>,
    pub status: RelayState,
}

/// The node's side of the relay command slot: consume pending commands and
/// report executed state back.
pub trait RelayEndpoint {
    fn poll(&mut self) -> Result<RelayPoll>;
    fn report(&mut self, status: RelayState) -> Result<()>;
}

impl<T: RelayEndpoint + ?Sized> RelayEndpoint for &mut T {
    fn poll(&mut self) -> Result<RelayPoll> {
        (**self).poll()
    }

    fn report(&mut self, status: RelayState) -> Result<()> {
        (**self).report(status)
    }
}

/// The physical (or simulated) relay contact.
pub trait RelayDriver {
    fn apply(&mut self, command: RelayState);
    fn status(&self) -> RelayState;
}

/// In-memory relay contact for bench runs and tests.
#[derive(Debug)]
pub struct SimulatedRelay {
    state: RelayState,
}

impl SimulatedRelay {
    pub fn new(initial: RelayState) -> Self {
        Self { state: initial }
    }
}

impl Default for SimulatedRelay {
    fn default() -> Self {
        Self::new(RelayState::Off)
    }
}

impl RelayDriver for SimulatedRelay {
    fn apply(&mut self, command: RelayState) {
        self.state = command;
    }

    fn status(&self) -> RelayState {
        self.state
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    status: RelayState,
}

/// HTTP report sink posting to the ingestion endpoint.
#[derive(Debug)]
pub struct HttpReportSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpReportSink {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/readings", api_url.trim_end_matches('/')),
        })
    }
}

impl ReportSink for HttpReportSink {
    fn submit(&mut self, measurement: &Measurement) -> Result<()> {
        let response = self.client.post(&self.url).json(measurement).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(current_a = measurement.current_a, "measurement submitted");
        Ok(())
    }
}

/// HTTP relay endpoint against the command-slot routes.
#[derive(Debug)]
pub struct HttpRelayEndpoint {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpRelayEndpoint {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/relay", api_url.trim_end_matches('/')),
        })
    }
}

impl RelayEndpoint for HttpRelayEndpoint {
    fn poll(&mut self) -> Result<RelayPoll> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(response.json()?)
    }

    fn report(&mut self, status: RelayState) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&StatusReport { status })
            .send()?;
        let code = response.status();
        if !code.is_success() {
            return Err(TransportError::Rejected {
                status: code.as_u16(),
            });
        }
        Ok(())
    }
}

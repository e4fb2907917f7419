//! ---
//! vatio_section: "05-sensing-node"
//! vatio_subsection: "module"
//! vatio_type: "source"
//! vatio_scope: "code"
//! vatio_description: "Sensing-node runtime: acquisition loop, transport, relay actuation."
//! vatio_version: "v0.1.0"
//! vatio_owner: "tbd"
//! ---
//! The sensing-node runtime: a single-threaded cooperative loop that samples
//! the transducers, folds cycle-RMS current and vibration windows, ships
//! reports upstream, and services the relay command slot. Transport sits
//! behind traits so the loop runs identically against HTTP or test doubles.

pub mod node;
pub mod transport;

pub use node::MeterNode;
pub use transport::{
    HttpRelayEndpoint, HttpReportSink, RelayDriver, RelayEndpoint, RelayPoll, ReportSink,
    SimulatedRelay, TransportError,
};

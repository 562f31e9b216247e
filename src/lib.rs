//! Reliable telemetry over a constrained, half-duplex long-range radio link.
//!
//! Outpost turns an unreliable single-channel radio into a dependable
//! request/acknowledge transport between two fixed endpoints: a duty-cycled,
//! battery/solar-powered remote sensor node and a mains-powered base station.
//!
//! # Features
//!
//! - **Acknowledged delivery**: every message is retried with linear backoff
//!   and awaited for a matching PONG, within hard retry/timeout budgets
//! - **Duty-cycled power management**: battery classification, solar charging
//!   detection and a sleep policy that gates when the remote transmits
//! - **Link telemetry**: a fixed-capacity history of transmission outcomes
//!   with derived success-rate, signal and latency aggregates
//! - **Hardware-agnostic**: the physical radio and ADC sensing are consumed
//!   through narrow capability traits, so the core runs anywhere
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use outpost::{Outpost, NodeExit};
//! use tokio_util::sync::CancellationToken;
//! # struct MyRadio; struct MySense;
//! # use outpost::{Radio, SignalQuality, PowerSense, AdcChannel, RadioError};
//! # #[async_trait::async_trait]
//! # impl Radio for MyRadio {
//! #     async fn transmit(&mut self, _: &[u8]) -> Result<(), RadioError> { Ok(()) }
//! #     async fn available(&mut self) -> bool { false }
//! #     async fn read_frame(&mut self) -> Result<Vec<u8>, RadioError> { Ok(vec![]) }
//! #     fn signal_quality(&mut self) -> SignalQuality { SignalQuality::UNKNOWN }
//! #     async fn sleep(&mut self) {}
//! #     async fn standby(&mut self) {}
//! # }
//! # impl PowerSense for MySense {
//! #     fn read_raw_adc(&mut self, _: AdcChannel) -> u16 { 3500 }
//! # }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // Radio and ADC drivers are brought up outside the crate
//!     let mut node = Outpost::remote(MyRadio, MySense);
//!
//!     loop {
//!         match node.run(CancellationToken::new()).await {
//!             NodeExit::DeepSleep { duration } => {
//!                 tokio::time::sleep(duration).await;
//!                 // Deep sleep is a restart boundary: fresh state on wake
//!                 node = Outpost::remote(MyRadio, MySense);
//!             }
//!             NodeExit::Cancelled => break,
//!         }
//!     }
//! }
//! ```

// Core types and error handling
mod envelope;
mod error;
pub mod radio;
pub mod telemetry;
#[cfg(test)]
mod test_utils;

// Link and scheduling architecture
pub mod node;
pub mod power;
pub mod transport;

// Core exports
pub use envelope::{Envelope, Message, MessageKind, Metrics, MAX_PACKET_SIZE};
pub use error::{CodecError, RadioError, Result, TransportError};

// Capability exports
pub use power::{
    AdcChannel, BatteryState, ChargingState, PowerConfig, PowerMonitor, PowerSense, SleepMode,
    SleepPolicy,
};
pub use radio::{ChannelConfig, Radio, SignalQuality};

// Link exports
pub use telemetry::{TransmissionLog, TransmissionRecord};
pub use transport::{AckPolicy, LinkConfig, LinkTransport, Received, SendOutcome};

// Main API exports
pub use node::base::{BaseEvent, BaseStation, RemoteStatus};
pub use node::remote::{NodeConfig, NodeExit, NodeStatus, RemoteNode};

/// Unified entry point for the two link roles.
///
/// Thin constructors over [`RemoteNode`] and [`BaseStation`] with the
/// reference configuration for each role.
///
/// # Examples
///
/// ## Remote sensor node
/// ```rust,ignore
/// let node = Outpost::remote(radio, sense);
/// ```
///
/// ## Base station
/// ```rust,ignore
/// let base = Outpost::base(radio);
/// ```
pub struct Outpost;

impl Outpost {
    /// Create a remote sensor node with the reference configuration.
    ///
    /// The remote transmits a metrics snapshot every 30 seconds while its
    /// battery is normal, acknowledges base-station pings, and suspends
    /// itself per the sleep policy otherwise.
    pub fn remote<R: Radio, S: PowerSense>(radio: R, sense: S) -> RemoteNode<R, S> {
        RemoteNode::new(radio, sense)
    }

    /// Create a base station with the reference configuration.
    ///
    /// The base acknowledges every inbound non-PONG message, tracks the
    /// remote's reported power state, and measures link loss and latency.
    pub fn base<R: Radio>(radio: R) -> BaseStation<R> {
        BaseStation::new(radio)
    }
}

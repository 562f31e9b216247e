//! Error types for the telemetry link.
//!
//! Three domains, matching the layers of the stack:
//!
//! - [`RadioError`]: failures reported by the external radio driver
//! - [`CodecError`]: message envelopes that cannot be built or parsed
//! - [`TransportError`]: send/receive failures at the link layer
//!
//! ## Recovery and retry
//!
//! Transport errors know whether retrying makes sense:
//!
//! ```rust
//! use outpost::TransportError;
//! use std::time::Duration;
//!
//! let error = TransportError::AckTimeout { id: 7, timeout: Duration::from_millis(1000) };
//! if error.is_retryable() {
//!     println!("Can retry this operation");
//! }
//! ```
//!
//! Retry budgets are hard caps: the transport retries [`TransportError::PhysicalSend`]
//! and [`TransportError::AckTimeout`] internally, and surfaces
//! [`TransportError::RetriesExhausted`] once the budget is spent. Nothing at the
//! link layer terminates the process; orchestrators log the failure and continue.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// Error reported by the external radio driver.
///
/// The driver's native diagnostics are integer codes; they are carried through
/// verbatim so operators can look them up against the driver's documentation.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RadioError {
    #[error("radio transmit failed (driver code {code})")]
    Transmit { code: i32 },

    #[error("radio receive failed (driver code {code})")]
    Receive { code: i32 },

    #[error("radio driver error: {reason}")]
    Driver { reason: String },
}

impl RadioError {
    /// Helper constructor for driver errors without a numeric code.
    pub fn driver(reason: impl Into<String>) -> Self {
        RadioError::Driver { reason: reason.into() }
    }
}

/// Error producing or parsing a message envelope.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("malformed message document: {details}")]
    Malformed { details: String },

    #[error("message document is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("encoded message is {size} bytes, exceeding the {max} byte packet limit")]
    Oversize { size: usize, max: usize },
}

impl CodecError {
    /// Helper constructor for malformed-document errors.
    pub fn malformed(details: impl Into<String>) -> Self {
        CodecError::Malformed { details: details.into() }
    }
}

/// Main error type for link transport operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// A single physical transmit attempt failed at the radio level.
    #[error("physical transmit failed on attempt {attempt}")]
    PhysicalSend {
        attempt: u32,
        #[source]
        source: RadioError,
    },

    /// No matching acknowledgment arrived within the wait budget.
    #[error("no acknowledgment for message {id} within {timeout:?}")]
    AckTimeout { id: u32, timeout: Duration },

    /// Terminal failure of one `send` call; the retry budget is spent.
    #[error("message {id} abandoned after {attempts} attempts")]
    RetriesExhausted { id: u32, attempts: u32 },

    /// A received frame could not be decoded. Distinct from "nothing waiting".
    #[error("received frame could not be decoded")]
    Codec(#[from] CodecError),

    /// Radio failure outside a counted transmit attempt (e.g. while reading).
    #[error("radio error")]
    Radio(#[from] RadioError),
}

impl TransportError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// The transport already retries the retryable ones internally; callers
    /// seeing them directly (from `receive`) may simply try again next tick.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::PhysicalSend { .. } => true,
            TransportError::AckTimeout { .. } => true,
            TransportError::Radio(_) => true,
            TransportError::RetriesExhausted { .. } => false,
            TransportError::Codec(_) => false,
        }
    }

    /// Helper constructor for a failed physical attempt.
    pub fn physical_send(attempt: u32, source: RadioError) -> Self {
        TransportError::PhysicalSend { attempt, source }
    }
}

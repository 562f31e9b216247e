//! Link transport: send-with-retry, acknowledgment waiting, auto-ack receive.
//!
//! One transport per node. It exclusively owns the radio and the message-id
//! counter; there is exactly one in-flight outbound message at a time. A
//! non-ack send blocks in a bounded polling loop until the matching PONG
//! arrives or the ack timeout elapses, and an ack timeout re-enters the retry
//! loop until the retry budget is spent. The whole cycle can therefore occupy
//! the node for up to `ACK_TIMEOUT * MAX_RETRIES`, an accepted latency cost of
//! the half-duplex design.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::envelope::{Envelope, Message, MessageKind, Metrics};
use crate::error::{Result, TransportError};
use crate::radio::{Radio, SignalQuality};

/// Which inbound messages get an automatic PONG.
///
/// The remote node acknowledges only PING (its DATA/STATUS uplinks are the
/// ones being acknowledged); the base station acknowledges everything that is
/// not itself an ack. PONG is never acknowledged under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    PingOnly,
    AllInbound,
}

/// Retry, timeout and acknowledgment parameters for the link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Maximum physical transmissions per `send` call.
    pub max_retries: u32,
    /// How long to wait for a matching PONG after each transmission.
    pub ack_timeout: Duration,
    /// Receive-poll cadence inside the ack wait.
    pub ack_poll_interval: Duration,
    /// Linear backoff step after a failed physical transmit
    /// (attempt n sleeps `n * backoff_step`).
    pub backoff_step: Duration,
    /// Automatic acknowledgment policy for this node's role.
    pub ack_policy: AckPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            ack_timeout: Duration::from_millis(1000),
            ack_poll_interval: Duration::from_millis(10),
            backoff_step: Duration::from_millis(100),
            ack_policy: AckPolicy::PingOnly,
        }
    }
}

impl LinkConfig {
    /// Configuration for the base-station role: ack every inbound non-PONG.
    pub fn base_station() -> Self {
        Self { ack_policy: AckPolicy::AllInbound, ..Self::default() }
    }
}

/// Result of a completed `send` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendOutcome {
    /// Id assigned to the message.
    pub id: u32,
    /// Physical retransmissions consumed before success (0 = first attempt).
    pub retries: u32,
    /// Time from the first transmit to completion.
    pub latency: Duration,
    /// Signal quality of the acknowledgment, when one was awaited.
    pub signal: Option<SignalQuality>,
}

/// A decoded inbound message with its measured link quality.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub message: Message,
    pub signal: SignalQuality,
}

/// Reliable request/acknowledge transport over a half-duplex radio.
pub struct LinkTransport<R> {
    radio: R,
    config: LinkConfig,
    /// Next outbound message id. Starts at 1, increments per send with no
    /// reuse within the process lifetime; wraps at the u32 boundary.
    next_id: u32,
    boot: Instant,
}

impl<R: Radio> LinkTransport<R> {
    /// Create a transport with the default (remote-role) configuration.
    pub fn new(radio: R) -> Self {
        Self::with_config(radio, LinkConfig::default())
    }

    /// Create a transport with an explicit configuration.
    pub fn with_config(radio: R, config: LinkConfig) -> Self {
        Self { radio, config, next_id: 1, boot: Instant::now() }
    }

    /// The active configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Direct access to the underlying radio.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Seconds since this transport was created (the node's boot, in practice).
    pub fn timestamp(&self) -> u64 {
        self.boot.elapsed().as_secs()
    }

    /// Send a message, retrying up to the configured budget.
    ///
    /// Allocates the next id, encodes the envelope, and attempts physical
    /// transmission up to `max_retries` times with linear backoff after radio
    /// failures. For non-ack kinds each successful transmit is followed by a
    /// bounded wait for the matching PONG; an ack timeout re-transmits until
    /// the budget is spent. Exhaustion surfaces as
    /// [`TransportError::RetriesExhausted`] with no further side effects.
    pub async fn send(
        &mut self,
        kind: MessageKind,
        metrics: Option<Metrics>,
        payload: Option<String>,
    ) -> Result<SendOutcome> {
        let id = self.allocate_id();
        let mut envelope = Envelope::new(kind, id, self.timestamp());
        envelope.metrics = metrics;
        envelope.payload = payload;
        let frame = envelope.encode()?;

        let start = Instant::now();
        for attempt in 0..self.config.max_retries {
            trace!(id, %kind, attempt = attempt + 1, "transmitting");

            if let Err(e) = self.radio.transmit(&frame).await {
                let error = TransportError::physical_send(attempt, e);
                warn!(id, attempt = attempt + 1, %error, "retrying after backoff");
                tokio::time::sleep(self.config.backoff_step * (attempt + 1)).await;
                continue;
            }

            if kind.is_ack() {
                // Acks are fire-and-forget; waiting would ack an ack.
                return Ok(SendOutcome {
                    id,
                    retries: attempt,
                    latency: start.elapsed(),
                    signal: None,
                });
            }

            match self.wait_for_ack(id).await {
                Some(signal) => {
                    debug!(id, retries = attempt, "acknowledgment received");
                    return Ok(SendOutcome {
                        id,
                        retries: attempt,
                        latency: start.elapsed(),
                        signal: Some(signal),
                    });
                }
                None => {
                    debug!(id, attempt = attempt + 1, "acknowledgment timeout");
                }
            }
        }

        warn!(id, attempts = self.config.max_retries, "send abandoned");
        Err(TransportError::RetriesExhausted { id, attempts: self.config.max_retries })
    }

    /// Send a DATA message carrying a metrics snapshot.
    pub async fn send_metrics(&mut self, metrics: Metrics) -> Result<SendOutcome> {
        self.send(MessageKind::Data, Some(metrics), None).await
    }

    /// Send a STATUS message with text and metrics.
    pub async fn send_status(
        &mut self,
        status: impl Into<String>,
        metrics: Metrics,
    ) -> Result<SendOutcome> {
        self.send(MessageKind::Status, Some(metrics), Some(status.into())).await
    }

    /// Ping the peer and measure the round trip.
    ///
    /// The outcome's `latency` is the round-trip time and `signal` the
    /// measured quality of the returning PONG.
    pub async fn ping(&mut self) -> Result<SendOutcome> {
        self.send(MessageKind::Ping, Some(Metrics::new()), None).await
    }

    /// Non-blocking poll of the receive path.
    ///
    /// Returns `Ok(None)` when nothing is waiting. A frame that cannot be
    /// decoded is a [`TransportError::Codec`] error, distinct from the
    /// nothing-waiting case. A decoded PING (or, for the base-station policy,
    /// any non-PONG) is acknowledged before this returns; ack transmission
    /// failures are logged, never propagated, and never themselves awaited.
    pub async fn receive(&mut self) -> Result<Option<Received>> {
        if !self.radio.available().await {
            return Ok(None);
        }

        let frame = self.radio.read_frame().await.map_err(TransportError::Radio)?;
        let signal = self.radio.signal_quality();

        let message = Message::decode(&frame)?;
        trace!(id = message.id(), kind = %message.kind(), rssi = signal.rssi, "received");

        let should_ack = match self.config.ack_policy {
            AckPolicy::PingOnly => message.kind() == MessageKind::Ping,
            AckPolicy::AllInbound => !message.kind().is_ack(),
        };

        if should_ack {
            // A ping's metrics are echoed back so the sender can compare both
            // directions of the link.
            let echoed = match &message {
                Message::Ping { metrics, .. } => metrics.clone(),
                _ => None,
            };
            self.send_ack(message.id(), echoed).await;
        }

        Ok(Some(Received { message, signal }))
    }

    /// Quiesce the radio before a duty-cycle sleep.
    pub async fn sleep_radio(&mut self) {
        self.radio.sleep().await;
        debug!("radio sleeping");
    }

    /// Bring the radio back to standby after waking.
    pub async fn wake_radio(&mut self) {
        self.radio.standby().await;
        debug!("radio awake");
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Poll the receive path until the matching PONG arrives or the ack
    /// timeout elapses. Other traffic arriving meanwhile is acked per policy
    /// and dropped.
    async fn wait_for_ack(&mut self, id: u32) -> Option<SignalQuality> {
        let deadline = Instant::now() + self.config.ack_timeout;

        while Instant::now() < deadline {
            match self.receive().await {
                Ok(Some(received)) => match received.message {
                    Message::Pong { acked_id, .. } if acked_id == id => {
                        return Some(received.signal);
                    }
                    Message::Pong { acked_id, .. } => {
                        trace!(acked_id, awaiting = id, "pong for a different message");
                    }
                    other => {
                        debug!(kind = %other.kind(), "dropping message received during ack wait");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    debug!(error = %e, "undecodable frame during ack wait");
                }
            }

            tokio::time::sleep(self.config.ack_poll_interval).await;
        }

        None
    }

    /// Transmit a PONG carrying the acknowledged message's id.
    ///
    /// Consumes no id from the counter. Physical failures are retried with
    /// the same backoff as any transmit, but a spent budget is only logged:
    /// there is no ack of an ack to wait for and no caller to fail.
    async fn send_ack(&mut self, acked_id: u32, metrics: Option<Metrics>) {
        let mut envelope = Envelope::new(MessageKind::Pong, acked_id, self.timestamp());
        envelope.metrics = metrics;

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(acked_id, error = %e, "could not encode acknowledgment");
                return;
            }
        };

        for attempt in 0..self.config.max_retries {
            match self.radio.transmit(&frame).await {
                Ok(()) => {
                    trace!(acked_id, "acknowledgment sent");
                    return;
                }
                Err(e) => {
                    warn!(acked_id, attempt = attempt + 1, error = %e, "acknowledgment transmit failed");
                    tokio::time::sleep(self.config.backoff_step * (attempt + 1)).await;
                }
            }
        }

        warn!(acked_id, "failed to acknowledge message");
    }
}

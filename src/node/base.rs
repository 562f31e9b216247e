//! Base station orchestrator.
//!
//! The mains-powered end of the link: polls the receive path continuously,
//! acknowledges everything inbound, tracks the remote node's reported power
//! state, and serves the operator surface (ping, structured status report).
//! Loss and latency figures are measured, not estimated: loss from gaps in
//! the remote's monotonically increasing message ids, latency from the round
//! trips of the base's own pings.

use futures::Stream;
use serde_json::json;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::envelope::{Message, Metrics};
use crate::error::{Result, TransportError};
use crate::radio::{Radio, SignalQuality};
use crate::telemetry::{TransmissionLog, TransmissionRecord};
use crate::transport::{LinkConfig, LinkTransport, SendOutcome};

/// Last reported state of the remote node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteStatus {
    pub battery_volts: f64,
    pub battery_percent: u8,
    pub charging: bool,
    /// Base uptime (seconds) when the remote was last heard from.
    pub last_seen_uptime: u64,
}

/// A dispatched inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseEvent {
    Data { id: u32, metrics: Metrics },
    Status { id: u32, text: Option<String>, metrics: Option<Metrics> },
    Ping { id: u32 },
    /// A PONG outside any ack wait; usually a late ack for a retransmission.
    StrayAck { id: u32 },
}

/// Delivery accounting from the remote's id sequence.
///
/// The remote assigns ids monotonically, so the span between the first and
/// latest observed id is the number of messages it sent; anything missing
/// from the count was lost on the air. Wraparound at the u32 boundary is not
/// tracked — a remote reaching it within one boot is outside the design.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryTracker {
    first_id: Option<u32>,
    last_id: u32,
    received: u64,
}

impl DeliveryTracker {
    /// Account for a received remote message id.
    pub fn observe(&mut self, id: u32) {
        if self.first_id.is_none() {
            self.first_id = Some(id);
        }
        self.last_id = self.last_id.max(id);
        self.received += 1;
    }

    /// Messages the remote must have sent, judging by its id span.
    pub fn expected(&self) -> u64 {
        match self.first_id {
            Some(first) => u64::from(self.last_id - first) + 1,
            None => 0,
        }
    }

    /// Fraction of expected messages that never arrived; 0 before any.
    pub fn loss_rate(&self) -> f64 {
        let expected = self.expected();
        if expected == 0 {
            return 0.0;
        }
        // Duplicate receptions (re-transmissions that were acked late) can
        // push received past expected; clamp instead of reporting negative loss.
        (1.0 - self.received as f64 / expected as f64).max(0.0)
    }
}

/// Mains-powered base station end of the link.
pub struct BaseStation<R> {
    transport: LinkTransport<R>,
    /// Outcomes of the base's own pings; feeds the reported latency.
    log: TransmissionLog,
    delivery: DeliveryTracker,
    packets_received: u64,
    decode_errors: u64,
    status_text: String,
    last_signal: SignalQuality,
    remote_tx: watch::Sender<Option<RemoteStatus>>,
    remote_rx: watch::Receiver<Option<RemoteStatus>>,
}

impl<R: Radio> BaseStation<R> {
    /// Create a base station with the default base-role configuration.
    pub fn new(radio: R) -> Self {
        Self::with_config(radio, LinkConfig::base_station())
    }

    /// Create a base station with an explicit link configuration.
    pub fn with_config(radio: R, config: LinkConfig) -> Self {
        let (remote_tx, remote_rx) = watch::channel(None);
        Self {
            transport: LinkTransport::with_config(radio, config),
            log: TransmissionLog::new(),
            delivery: DeliveryTracker::default(),
            packets_received: 0,
            decode_errors: 0,
            status_text: "Base Station Ready".to_string(),
            last_signal: SignalQuality::UNKNOWN,
            remote_tx,
            remote_rx,
        }
    }

    /// Total well-formed messages received.
    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// Frames that arrived but could not be decoded.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Human-readable last outcome line.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Last reported remote state, if the remote has been heard from.
    pub fn remote_status(&self) -> Option<RemoteStatus> {
        *self.remote_rx.borrow()
    }

    /// Subscribe to remote-status updates as a stream.
    pub fn subscribe_remote_status(&self) -> impl Stream<Item = Option<RemoteStatus>> + 'static {
        WatchStream::new(self.remote_rx.clone())
    }

    /// Direct access to the underlying radio.
    pub fn radio_mut(&mut self) -> &mut R {
        self.transport.radio_mut()
    }

    /// Poll the receive path once and dispatch whatever arrived.
    ///
    /// Acknowledgment already happened inside the transport by the time an
    /// event is returned. Decode failures are counted and swallowed; the
    /// station never stops over a bad frame.
    pub async fn poll(&mut self) -> Option<BaseEvent> {
        let received = match self.transport.receive().await {
            Ok(Some(received)) => received,
            Ok(None) => return None,
            Err(TransportError::Codec(e)) => {
                self.decode_errors += 1;
                debug!(error = %e, "dropped undecodable frame");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                return None;
            }
        };

        self.packets_received += 1;
        self.last_signal = received.signal;

        match received.message {
            Message::Data { id, metrics, .. } => {
                self.delivery.observe(id);
                self.update_remote(&metrics);
                self.status_text = "Data Received".to_string();
                info!(id, "data received from remote device");
                Some(BaseEvent::Data { id, metrics })
            }
            Message::Status { id, metrics, text, .. } => {
                self.delivery.observe(id);
                if let Some(metrics) = &metrics {
                    self.update_remote(metrics);
                }
                self.status_text =
                    text.clone().unwrap_or_else(|| "Status Received".to_string());
                info!(id, "status update received from remote device");
                Some(BaseEvent::Status { id, text, metrics })
            }
            Message::Ping { id, .. } => {
                // The transport already answered it
                self.status_text = "Ping Received".to_string();
                info!(id, "ping received from remote device");
                Some(BaseEvent::Ping { id })
            }
            Message::Pong { acked_id, .. } => {
                debug!(acked_id, "stray acknowledgment");
                Some(BaseEvent::StrayAck { id: acked_id })
            }
        }
    }

    /// Run the receive loop until cancelled.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("base station loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("base station loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.transport.config().ack_poll_interval) => {}
            }
            self.poll().await;
        }
    }

    /// Ping the remote device and record the round trip.
    pub async fn ping(&mut self) -> Result<SendOutcome> {
        let timestamp = self.transport.timestamp();
        let result = self.transport.ping().await;

        match &result {
            Ok(outcome) => {
                let signal = outcome.signal.unwrap_or(SignalQuality::UNKNOWN);
                self.log.record(TransmissionRecord {
                    id: outcome.id,
                    timestamp,
                    success: true,
                    rssi: signal.rssi,
                    snr: signal.snr,
                    retries: outcome.retries,
                    latency_ms: outcome.latency.as_millis() as u64,
                });
                self.status_text = "Ping Sent".to_string();
            }
            Err(TransportError::RetriesExhausted { id, attempts }) => {
                self.log.record(TransmissionRecord {
                    id: *id,
                    timestamp,
                    success: false,
                    rssi: SignalQuality::UNKNOWN.rssi,
                    snr: SignalQuality::UNKNOWN.snr,
                    retries: *attempts,
                    latency_ms: 0,
                });
                self.status_text = "Remote not responding".to_string();
            }
            Err(e) => warn!(error = %e, "ping could not be sent"),
        }

        result
    }

    /// Structured status report for the operator console.
    pub fn report(&self) -> serde_json::Value {
        let remote = self.remote_status();
        let uptime = self.transport.timestamp();

        json!({
            "uptime": uptime,
            "packets_received": self.packets_received,
            "errors": self.decode_errors,
            "remote_device": remote.map(|r| json!({
                "battery": r.battery_volts,
                "battery_percent": r.battery_percent,
                "charging": r.charging,
                "last_seen": uptime.saturating_sub(r.last_seen_uptime),
            })),
            "signal": {
                "rssi": self.last_signal.rssi,
                "snr": self.last_signal.snr,
                "packet_loss": self.delivery.loss_rate(),
                "latency": self.log.average_latency_ms(),
            },
        })
    }

    /// Pull battery figures out of an inbound metrics document.
    fn update_remote(&mut self, metrics: &Metrics) {
        let previous = self.remote_status();
        let status = RemoteStatus {
            battery_volts: metrics
                .get("battery")
                .and_then(|v| v.as_f64())
                .unwrap_or_else(|| previous.map_or(0.0, |r| r.battery_volts)),
            battery_percent: metrics
                .get("battery_percent")
                .and_then(|v| v.as_u64())
                .map(|v| v.min(100) as u8)
                .unwrap_or_else(|| previous.map_or(0, |r| r.battery_percent)),
            charging: metrics
                .get("charging")
                .and_then(|v| v.as_u64())
                .map(|v| v == 1)
                .unwrap_or_else(|| previous.is_some_and(|r| r.charging)),
            last_seen_uptime: self.transport.timestamp(),
        };
        let _ = self.remote_tx.send(Some(status));
    }
}

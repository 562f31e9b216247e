//! In-memory test doubles for the radio and power-sense capabilities.
//!
//! `MockRadio` simulates one end of the channel: scripted transmit failures,
//! a programmable responder that turns outbound frames into inbound replies,
//! and a queue of inbound frames. `MockPowerSense` returns fixed raw ADC
//! counts. Both exist only for tests; real deployments wrap actual drivers.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::envelope::{Envelope, Message, MessageKind};
use crate::error::RadioError;
use crate::power::{AdcChannel, PowerSense};
use crate::radio::{Radio, SignalQuality};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// Scriptable single-ended radio double.
pub struct MockRadio {
    transmitted: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
    fail_transmits: u32,
    responder: Option<Responder>,
    signal: SignalQuality,
    sleeping: Arc<AtomicBool>,
}

impl MockRadio {
    /// A radio whose peer never replies.
    pub fn silent() -> Self {
        Self {
            transmitted: Vec::new(),
            inbound: VecDeque::new(),
            fail_transmits: 0,
            responder: None,
            signal: SignalQuality { rssi: -75, snr: 8.0 },
            sleeping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A radio whose peer immediately acknowledges every non-PONG frame.
    pub fn acking() -> Self {
        let mut radio = Self::silent();
        radio.respond_with_acks();
        radio
    }

    /// Replace the peer behavior with an ack-everything responder.
    pub fn respond_with_acks(&mut self) {
        self.respond_with(|frame| {
            let message = Message::decode(frame).ok()?;
            if message.kind().is_ack() {
                return None;
            }
            let pong = Envelope::new(MessageKind::Pong, message.id(), 0);
            Some(pong.encode().expect("pong fits the packet bound"))
        });
    }

    /// Install a custom peer: maps each transmitted frame to an optional reply.
    pub fn respond_with(
        &mut self,
        responder: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    ) {
        self.responder = Some(Box::new(responder));
    }

    /// Fail the next `n` transmit calls with a driver error.
    pub fn fail_next_transmits(&mut self, n: u32) {
        self.fail_transmits = n;
    }

    /// Queue a frame as if the peer had transmitted it.
    pub fn push_inbound(&mut self, frame: Vec<u8>) {
        self.inbound.push_back(frame);
    }

    /// Frames successfully handed to `transmit`, oldest first.
    pub fn transmitted(&self) -> &[Vec<u8>] {
        &self.transmitted
    }

    /// Number of successful transmissions.
    pub fn transmit_count(&self) -> usize {
        self.transmitted.len()
    }

    /// Shared flag observing sleep/standby transitions.
    pub fn sleep_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.sleeping)
    }
}

#[async_trait::async_trait]
impl Radio for MockRadio {
    async fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        if self.fail_transmits > 0 {
            self.fail_transmits -= 1;
            return Err(RadioError::Transmit { code: -1 });
        }

        self.transmitted.push(frame.to_vec());
        if let Some(responder) = &mut self.responder {
            if let Some(reply) = responder(frame) {
                self.inbound.push_back(reply);
            }
        }
        Ok(())
    }

    async fn available(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, RadioError> {
        self.inbound.pop_front().ok_or(RadioError::Receive { code: -2 })
    }

    fn signal_quality(&mut self) -> SignalQuality {
        self.signal
    }

    async fn sleep(&mut self) {
        self.sleeping.store(true, Ordering::SeqCst);
    }

    async fn standby(&mut self) {
        self.sleeping.store(false, Ordering::SeqCst);
    }
}

/// Fixed-level power-sense double.
pub struct MockPowerSense {
    battery_volts: f32,
    solar_volts: f32,
}

impl MockPowerSense {
    pub fn new(battery_volts: f32, solar_volts: f32) -> Self {
        Self { battery_volts, solar_volts }
    }
}

impl PowerSense for MockPowerSense {
    fn read_raw_adc(&mut self, channel: AdcChannel) -> u16 {
        let volts = match channel {
            AdcChannel::Battery => self.battery_volts,
            AdcChannel::Solar => self.solar_volts,
        };
        ((volts / 3.9) * 4095.0).round() as u16
    }
}

//! Radio capability trait for physical transceivers.
//!
//! The physical layer (modulation, chip registers, SPI timing) lives outside
//! this crate. Implementations hand the transport a narrow
//! transmit/poll/read capability; bring-up happens in the driver before a
//! [`Radio`] is passed in, so a failed bring-up surfaces before any node is
//! constructed.

use crate::error::RadioError;

/// Measured link quality of the most recent reception.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalQuality {
    /// Received signal strength indicator in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: f32,
}

impl SignalQuality {
    /// Placeholder quality before anything has been received.
    pub const UNKNOWN: SignalQuality = SignalQuality { rssi: -120, snr: 0.0 };
}

/// Fixed physical-channel parameters.
///
/// Both endpoints must be configured bit-for-bit identically or no packets
/// will decode. The values here are handed to the driver at bring-up; the
/// defaults are the minimal known-good configuration for a 915 MHz link.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Carrier frequency in MHz (915.0 US, 868.0 EU).
    pub frequency_mhz: f32,
    /// Bandwidth in kHz.
    pub bandwidth_khz: f32,
    /// Spreading factor (lower is faster, shorter range).
    pub spreading_factor: u8,
    /// Coding rate denominator (5 means 4/5).
    pub coding_rate: u8,
    /// Sync word separating this network from neighbors.
    pub sync_word: u8,
    /// Output power in dBm.
    pub output_power_dbm: i8,
    /// Preamble length in symbols.
    pub preamble_symbols: u16,
    /// Hardware CRC on every packet.
    pub crc: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            bandwidth_khz: 500.0,
            spreading_factor: 6,
            coding_rate: 5,
            sync_word: 0x34,
            output_power_dbm: 2,
            preamble_symbols: 8,
            crc: true,
        }
    }
}

/// Capability contract for a half-duplex packet radio.
///
/// The transport owns the radio exclusively while a send/ack cycle is active;
/// implementations do not need to be re-entrant. Methods are async because
/// real drivers block on chip busy lines and transmission airtime.
#[async_trait::async_trait]
pub trait Radio: Send + 'static {
    /// Transmit one frame.
    ///
    /// Returns once the frame is fully on the air, or a [`RadioError`] with
    /// the driver's diagnostic code on failure.
    async fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError>;

    /// Whether a received packet is waiting to be read.
    async fn available(&mut self) -> bool;

    /// Read the waiting packet.
    ///
    /// Only called after [`available`](Radio::available) reported true; the
    /// returned bytes are one whole frame.
    async fn read_frame(&mut self) -> Result<Vec<u8>, RadioError>;

    /// Link quality of the most recently received frame.
    fn signal_quality(&mut self) -> SignalQuality;

    /// Put the transceiver into its lowest-power state.
    async fn sleep(&mut self);

    /// Return the transceiver to standby, ready to transmit or receive.
    async fn standby(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_is_the_known_good_configuration() {
        let config = ChannelConfig::default();
        assert_eq!(config.frequency_mhz, 915.0);
        assert_eq!(config.spreading_factor, 6);
        assert_eq!(config.sync_word, 0x34);
        assert!(config.crc);
    }

    #[test]
    fn unknown_signal_quality_is_the_weak_signal_floor() {
        assert_eq!(SignalQuality::UNKNOWN.rssi, -120);
        assert_eq!(SignalQuality::UNKNOWN.snr, 0.0);
    }
}

//! End-to-end exchange between a remote node and a base station over a
//! simulated radio channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use outpost::{
    AdcChannel, BaseEvent, NodeExit, Outpost, PowerSense, Radio, RadioError, SignalQuality,
};

/// One end of a lossless in-memory channel; what one end transmits, the
/// other reads.
struct ChannelRadio {
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    peer: Arc<Mutex<VecDeque<Vec<u8>>>>,
    signal: SignalQuality,
}

fn channel_pair() -> (ChannelRadio, ChannelRadio) {
    let uplink = Arc::new(Mutex::new(VecDeque::new()));
    let downlink = Arc::new(Mutex::new(VecDeque::new()));

    (
        ChannelRadio {
            inbound: Arc::clone(&downlink),
            peer: Arc::clone(&uplink),
            signal: SignalQuality { rssi: -88, snr: 5.5 },
        },
        ChannelRadio {
            inbound: uplink,
            peer: downlink,
            signal: SignalQuality { rssi: -84, snr: 6.0 },
        },
    )
}

#[async_trait::async_trait]
impl Radio for ChannelRadio {
    async fn transmit(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        self.peer.lock().expect("channel lock").push_back(frame.to_vec());
        Ok(())
    }

    async fn available(&mut self) -> bool {
        !self.inbound.lock().expect("channel lock").is_empty()
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, RadioError> {
        self.inbound
            .lock()
            .expect("channel lock")
            .pop_front()
            .ok_or(RadioError::Receive { code: -2 })
    }

    fn signal_quality(&mut self) -> SignalQuality {
        self.signal
    }

    async fn sleep(&mut self) {}

    async fn standby(&mut self) {}
}

/// Healthy battery on a sunny day.
struct FieldSense;

impl PowerSense for FieldSense {
    fn read_raw_adc(&mut self, channel: AdcChannel) -> u16 {
        let volts: f64 = match channel {
            AdcChannel::Battery => 3.8,
            AdcChannel::Solar => 2.0,
        };
        ((volts / 3.9) * 4095.0).round() as u16
    }
}

#[tokio::test(start_paused = true)]
async fn remote_uplinks_reach_the_base_and_are_acknowledged() {
    let (remote_radio, base_radio) = channel_pair();

    let mut node = Outpost::remote(remote_radio, FieldSense);
    let cancel = CancellationToken::new();
    let node_cancel = cancel.clone();
    let node_task = tokio::spawn(async move {
        let exit = node.run(node_cancel).await;
        (node, exit)
    });

    // Drive the base through the startup uplink and two periodic ones
    let mut base = Outpost::base(base_radio);
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(65);
    while Instant::now() < deadline {
        if let Some(event) = base.poll().await {
            events.push(event);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let data_count =
        events.iter().filter(|e| matches!(e, BaseEvent::Data { .. })).count();
    assert_eq!(data_count, 3, "startup uplink plus the 30s and 60s ticks");
    assert_eq!(base.packets_received(), 3);
    assert_eq!(base.status_text(), "Data Received");

    // The base tracked the power state the remote reported
    let remote_status = base.remote_status().expect("remote heard from");
    assert!((remote_status.battery_volts - 3.8).abs() < 0.05);
    assert!(!remote_status.charging, "no solar input in this scenario");

    // No id gaps over a lossless channel
    let report = base.report();
    assert_eq!(report["signal"]["packet_loss"], serde_json::json!(0.0));
    assert_eq!(report["errors"], serde_json::json!(0));

    // Operator ping: the remote's idle loop answers it
    let outcome = base.ping().await.expect("remote answers the ping");
    assert!(outcome.signal.is_some());
    assert_eq!(base.status_text(), "Ping Sent");

    cancel.cancel();
    let (node, exit) = node_task.await.expect("join");
    assert_eq!(exit, NodeExit::Cancelled);

    // Every uplink was acknowledged, so the remote's aggregates are clean
    assert_eq!(node.telemetry().success_rate(), 1.0);
    assert_eq!(node.telemetry().total_packets(), 3);
    assert_eq!(node.telemetry().average_rssi(), -88, "ack quality as measured by the remote");

    let status = node.status();
    assert_eq!(status.status_text, "Data sent successfully");
    assert_eq!(status.total_packets, 3);
}

#[tokio::test(start_paused = true)]
async fn base_ping_round_trips_while_the_remote_idles() {
    let (remote_radio, base_radio) = channel_pair();

    let mut node = Outpost::remote(remote_radio, FieldSense);
    let cancel = CancellationToken::new();
    let node_cancel = cancel.clone();
    let node_task = tokio::spawn(async move {
        let exit = node.run(node_cancel).await;
        (node, exit)
    });

    let mut base = Outpost::base(base_radio);

    // Absorb the remote's startup uplink first
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        base.poll().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The remote polls its receive path every idle tick, so the ping is
    // answered well within one ack timeout
    let outcome = base.ping().await.expect("pong within the ack window");
    assert_eq!(outcome.retries, 0);
    assert!(outcome.latency <= Duration::from_millis(1000));

    // The reported latency is the measured round trip, not a placeholder
    let report = base.report();
    assert_eq!(
        report["signal"]["latency"].as_u64().expect("latency is milliseconds"),
        outcome.latency.as_millis() as u64
    );

    cancel.cancel();
    node_task.await.expect("join");
}

//! Battery and solar power monitoring, and the sleep policy it drives.
//!
//! Battery state is a pure function of the latest measured voltage against
//! ordered thresholds. Charging state compares the solar rail to the battery
//! plus a margin and requires a rising battery trend. The monitor caches the
//! battery reading and rate-limits physical sampling so a chatty caller does
//! not hammer the ADC.
//!
//! Sensor reads never fail: a deployment without physical sensing supplies a
//! [`PowerSense`] implementation that returns simulated values.

use std::time::Duration;

use tokio::time::Instant;

/// ADC input selector for the power sense capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcChannel {
    Battery,
    Solar,
}

/// Capability contract for raw voltage sensing.
///
/// Returns the raw ADC count for a channel; conversion to volts happens in
/// the monitor using the configured full-scale and calibration factor.
pub trait PowerSense: Send + 'static {
    fn read_raw_adc(&mut self, channel: AdcChannel) -> u16;
}

/// Battery condition derived from the latest voltage sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryState {
    Normal,
    Low,
    Critical,
}

/// Whether the solar input is actively charging the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    Charging,
    NotCharging,
    /// Only before the first sample has been taken.
    Unknown,
}

/// Suspension depth for a duty-cycle sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepMode {
    /// State-preserving suspension; execution resumes where it stopped.
    Light,
    /// Lowest-power suspension; waking is a full restart with fresh state.
    Deep,
}

/// One sleep decision: how deep, and for how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepPolicy {
    pub mode: SleepMode,
    pub duration: Duration,
}

/// Thresholds, margins and timing for power management.
#[derive(Debug, Clone)]
pub struct PowerConfig {
    /// At or below this voltage the battery is critical.
    pub critical_volts: f32,
    /// At or below this voltage (and above critical) the battery is low.
    pub low_volts: f32,
    /// Empty-battery voltage for the percentage estimate.
    pub min_volts: f32,
    /// Full-battery voltage for the percentage estimate.
    pub max_volts: f32,
    /// Solar must exceed battery by this much to count as charging.
    pub charging_margin_volts: f32,
    /// Solar must also exceed this absolute floor to count as charging.
    pub solar_floor_volts: f32,
    /// Minimum interval between physical battery reads.
    pub battery_read_interval: Duration,
    /// Volts at full ADC scale (12-bit, 11 dB attenuation).
    pub adc_full_scale_volts: f32,
    /// Sleep duration while the battery is normal.
    pub sleep_normal: Duration,
    /// Sleep duration while the battery is low.
    pub sleep_low: Duration,
    /// Sleep duration while the battery is critical.
    pub sleep_critical: Duration,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            critical_volts: 3.3,
            low_volts: 3.5,
            min_volts: 3.0,
            max_volts: 4.2,
            charging_margin_volts: 0.5,
            solar_floor_volts: 4.5,
            battery_read_interval: Duration::from_secs(5),
            adc_full_scale_volts: 3.9,
            sleep_normal: Duration::from_secs(60),
            sleep_low: Duration::from_secs(300),
            sleep_critical: Duration::from_secs(1800),
        }
    }
}

/// Classify a battery voltage against the configured thresholds.
pub fn classify_battery(voltage: f32, config: &PowerConfig) -> BatteryState {
    if voltage <= config.critical_volts {
        BatteryState::Critical
    } else if voltage <= config.low_volts {
        BatteryState::Low
    } else {
        BatteryState::Normal
    }
}

/// Classify charging from the solar rail, the battery, and its previous sample.
///
/// Charging requires all three: solar above battery plus the margin, solar
/// above the absolute floor, and a strictly rising battery voltage.
pub fn classify_charging(
    battery: f32,
    solar: f32,
    previous_battery: f32,
    config: &PowerConfig,
) -> ChargingState {
    if solar > battery + config.charging_margin_volts
        && solar > config.solar_floor_volts
        && battery > previous_battery
    {
        ChargingState::Charging
    } else {
        ChargingState::NotCharging
    }
}

/// Pick the sleep mode and duration for the current power condition.
///
/// A critical battery that is charging stays on light sleep: the node is
/// recovering and deep sleep's restart would cost more than it saves.
pub fn select_sleep_policy(
    battery: BatteryState,
    charging: ChargingState,
    config: &PowerConfig,
) -> SleepPolicy {
    match battery {
        BatteryState::Normal => {
            SleepPolicy { mode: SleepMode::Light, duration: config.sleep_normal }
        }
        BatteryState::Low => SleepPolicy { mode: SleepMode::Light, duration: config.sleep_low },
        BatteryState::Critical => {
            let mode = if charging == ChargingState::Charging {
                SleepMode::Light
            } else {
                SleepMode::Deep
            };
            SleepPolicy { mode, duration: config.sleep_critical }
        }
    }
}

/// Owns the cached voltage readings and the sampling rate limit.
///
/// One monitor per remote node. The battery reading is cached and re-sampled
/// at most once per [`PowerConfig::battery_read_interval`]; the previous
/// sample is kept to detect the rising trend charging detection needs.
pub struct PowerMonitor<S> {
    sense: S,
    config: PowerConfig,
    calibration: f32,
    battery_voltage: f32,
    previous_battery_voltage: f32,
    solar_voltage: f32,
    charging: ChargingState,
    last_battery_read: Option<Instant>,
}

impl<S: PowerSense> PowerMonitor<S> {
    /// Create a monitor with the default configuration.
    pub fn new(sense: S) -> Self {
        Self::with_config(sense, PowerConfig::default())
    }

    /// Create a monitor with an explicit configuration.
    pub fn with_config(sense: S, config: PowerConfig) -> Self {
        assert!(
            config.critical_volts <= config.low_volts,
            "battery thresholds must be ordered: critical <= low"
        );
        Self {
            sense,
            config,
            calibration: 1.0,
            battery_voltage: 0.0,
            previous_battery_voltage: 0.0,
            solar_voltage: 0.0,
            charging: ChargingState::Unknown,
            last_battery_read: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    /// Latest battery voltage, re-sampling the ADC only if the cached value
    /// is older than the configured read interval.
    pub fn battery_voltage(&mut self) -> f32 {
        if self.battery_read_is_stale() {
            self.refresh_battery();
        }
        self.battery_voltage
    }

    /// Current solar rail voltage (always sampled fresh).
    pub fn solar_voltage(&mut self) -> f32 {
        let raw = self.sense.read_raw_adc(AdcChannel::Solar);
        self.solar_voltage = self.adc_to_voltage(raw);
        self.solar_voltage
    }

    /// Battery condition from the (possibly cached) latest sample.
    pub fn battery_state(&mut self) -> BatteryState {
        let voltage = self.battery_voltage();
        classify_battery(voltage, &self.config)
    }

    /// Charging condition from a fresh solar sample and the battery trend.
    pub fn charging_state(&mut self) -> ChargingState {
        let solar = self.solar_voltage();
        let battery = self.battery_voltage();
        self.charging =
            classify_charging(battery, solar, self.previous_battery_voltage, &self.config);

        tracing::debug!(solar, battery, state = ?self.charging, "charging status updated");
        self.charging
    }

    /// Estimated remaining battery charge, 0–100.
    pub fn battery_percentage(&mut self) -> u8 {
        let voltage = self.battery_voltage();
        let span = self.config.max_volts - self.config.min_volts;
        let fraction = (voltage - self.config.min_volts) / span;
        (fraction.clamp(0.0, 1.0) * 100.0) as u8
    }

    /// Derive a calibration factor from a reference measurement.
    pub fn calibrate(&mut self, known_voltage: f32) {
        let raw = self.sense.read_raw_adc(AdcChannel::Battery);
        let measured = self.adc_to_voltage(raw);
        if measured > 0.0 {
            self.calibration = known_voltage / measured;
            tracing::info!(factor = self.calibration, "battery ADC calibrated");
        }
    }

    /// Re-sample both rails and pick the sleep policy for the result.
    pub fn sleep_policy(&mut self) -> SleepPolicy {
        self.refresh_battery();
        let battery = classify_battery(self.battery_voltage, &self.config);
        let charging = self.charging_state();
        select_sleep_policy(battery, charging, &self.config)
    }

    fn battery_read_is_stale(&self) -> bool {
        match self.last_battery_read {
            Some(at) => at.elapsed() >= self.config.battery_read_interval,
            None => true,
        }
    }

    /// Force a physical battery sample, keeping the previous value for trend
    /// detection.
    fn refresh_battery(&mut self) {
        let raw = self.sense.read_raw_adc(AdcChannel::Battery);
        self.previous_battery_voltage = self.battery_voltage;
        self.battery_voltage = self.adc_to_voltage(raw);
        self.last_battery_read = Some(Instant::now());

        tracing::debug!(volts = self.battery_voltage, "battery sampled");
    }

    fn adc_to_voltage(&self, raw: u16) -> f32 {
        (f32::from(raw) / 4095.0) * self.config.adc_full_scale_volts * self.calibration
    }
}

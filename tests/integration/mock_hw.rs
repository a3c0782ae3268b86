//! Mock adapters for integration tests.
//!
//! Time only moves when the core sleeps (or a test advances it), so retry
//! pacing and TTLs can be asserted exactly.

use vitalnode::app::events::AppEvent;
use vitalnode::app::ports::{Clock, EventSink, FirmwareUpdatePort, PowerPort, SensorError, SensorPort};
use vitalnode::app::telemetry::{ClimateReading, MotionReading, PulseReading, Vector3};
use vitalnode::config::DeviceConfig;

// ── FakeClock ─────────────────────────────────────────────────

pub struct FakeClock {
    pub now_ms: u64,
    /// Unix time at `now_ms == 0`.
    pub epoch: i64,
    pub sleeps: Vec<u32>,
}

#[allow(dead_code)]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            epoch: 1_700_000_000,
            sleeps: Vec::new(),
        }
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }

    pub fn total_slept_ms(&self) -> u64 {
        self.sleeps.iter().map(|&s| u64::from(s)).sum()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn unix_time(&self) -> i64 {
        self.epoch + (self.now_ms / 1000) as i64
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.sleeps.push(ms);
        self.now_ms += u64::from(ms);
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── FakeOta ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeOta {
    pub requests: Vec<String>,
}

impl FirmwareUpdatePort for FakeOta {
    fn on_update_request(&mut self, payload: &str) {
        self.requests.push(payload.to_owned());
    }
}

// ── FakePower ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakePower {
    pub halts: u32,
    pub restarts: u32,
}

impl PowerPort for FakePower {
    fn halt(&mut self) {
        self.halts += 1;
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}

// ── FakeSensors ───────────────────────────────────────────────

pub struct FakeSensors {
    pub climate: Result<ClimateReading, SensorError>,
    pub pulse: Result<PulseReading, SensorError>,
    pub motion: Result<MotionReading, SensorError>,
    pub pulse_updates: u32,
}

impl Default for FakeSensors {
    fn default() -> Self {
        Self {
            climate: Ok(ClimateReading {
                temperature: 36.5,
                humidity: 41.0,
            }),
            pulse: Ok(PulseReading {
                heart_rate: 72.0,
                spo2: 98.0,
            }),
            motion: Ok(MotionReading {
                accel: Vector3 {
                    x: 0.0,
                    y: 0.0,
                    z: 1.0,
                },
                gyro: Vector3::default(),
            }),
            pulse_updates: 0,
        }
    }
}

impl SensorPort for FakeSensors {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        self.climate
    }

    fn read_pulse(&mut self) -> Result<PulseReading, SensorError> {
        self.pulse
    }

    fn read_motion(&mut self) -> Result<MotionReading, SensorError> {
        self.motion
    }

    fn update_pulse(&mut self, _now_ms: u64) {
        self.pulse_updates += 1;
    }
}

// ── Config ────────────────────────────────────────────────────

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        subscribe_topic: "vitalnode/in".into(),
        publish_topic: "vitalnode/out".into(),
        firmware_update_topic: "vitalnode/ota".into(),
        measure_interval_secs: 2,
        alert_duration_secs: 60,
        ..DeviceConfig::default()
    }
}

//! Property tests for the core state machines and encoders.
//!
//! Runs on host (x86_64) only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use vitalnode::adapters::device_id::device_id;
use vitalnode::app::alert::{AlertState, NO_ALERT};
use vitalnode::app::ports::{
    FirmwareUpdatePort, SensorError, SensorPort,
};
use vitalnode::app::publisher::TelemetryPublisher;
use vitalnode::app::router::{MessageRouter, TopicRoute};
use vitalnode::app::telemetry::{
    ClimateReading, ENVELOPE_FIELDS, MotionReading, PulseReading, SensorSample, Vector3,
};
use vitalnode::ota::{OtaManager, OtaRequest, OtaState};
use vitalnode::scheduler::{MeasurementScheduler, TickOutcome};

// ── Alert TTL ─────────────────────────────────────────────────

proptest! {
    /// A raised alert is visible for exactly `ttl` and gone for good after.
    #[test]
    fn alert_visible_exactly_for_ttl(
        t0 in 0u64..1_000_000,
        ttl in 1u64..120_000,
        checks in proptest::collection::vec(0u64..240_000, 1..20),
    ) {
        let mut checks = checks;
        checks.sort_unstable();

        let mut alerts = AlertState::new(ttl);
        alerts.raise("ALERT:temp-high", t0);
        let mut expired = false;
        for dt in checks {
            let shown = alerts.query(t0 + dt).to_owned();
            if dt < ttl && !expired {
                prop_assert_eq!(shown, "ALERT:temp-high");
            } else {
                expired = true;
                prop_assert_eq!(shown, NO_ALERT);
            }
        }
    }

    /// The newest raise always wins, and its own raise time drives expiry.
    #[test]
    fn newest_alert_overwrites(
        t_a in 0u64..10_000,
        gap in 0u64..10_000,
        ttl in 1u64..20_000,
    ) {
        let t_b = t_a + gap;
        let mut alerts = AlertState::new(ttl);
        alerts.raise("ALERT:a", t_a);
        alerts.raise("ALERT:b", t_b);

        prop_assert_eq!(alerts.raised_at(), Some(t_b));
        prop_assert_eq!(alerts.query(t_b + ttl - 1), "ALERT:b");
        prop_assert_eq!(alerts.query(t_b + ttl), NO_ALERT);
    }
}

// ── Scheduler rate separation ────────────────────────────────

#[derive(Default)]
struct CountingSensors {
    fast: u64,
}

impl SensorPort for CountingSensors {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        Err(SensorError::NotDetected)
    }

    fn read_pulse(&mut self) -> Result<PulseReading, SensorError> {
        Ok(PulseReading::default())
    }

    fn read_motion(&mut self) -> Result<MotionReading, SensorError> {
        Ok(MotionReading::default())
    }

    fn update_pulse(&mut self, _now_ms: u64) {
        self.fast += 1;
    }
}

proptest! {
    /// Full samples are never closer together than the interval, and the
    /// fast step runs once per tick whatever the outcome.
    #[test]
    fn scheduler_samples_at_most_once_per_interval(
        interval in 1u64..10_000,
        steps in proptest::collection::vec(0u64..3_000, 1..200),
    ) {
        let mut scheduler = MeasurementScheduler::new(interval, device_id("ESP32", &[0; 6]));
        let mut sensors = CountingSensors::default();
        let mut now = 0u64;
        let mut last_sample: Option<u64> = None;

        for step in &steps {
            now += step;
            if let TickOutcome::FullSample(_) = scheduler.tick(now, 0, &mut sensors) {
                if let Some(prev) = last_sample {
                    prop_assert!(now - prev >= interval);
                }
                last_sample = Some(now);
            }
        }
        prop_assert_eq!(sensors.fast, steps.len() as u64);
        prop_assert_eq!(scheduler.fast_updates(), steps.len() as u64);
    }
}

// ── Device identity ───────────────────────────────────────────

proptest! {
    #[test]
    fn device_id_is_prefix_and_twelve_upper_hex(
        mac in proptest::array::uniform6(any::<u8>()),
        prefix in "[A-Z0-9]{1,12}",
    ) {
        let id = device_id(&prefix, &mac);
        prop_assert_eq!(id.clone(), device_id(&prefix, &mac));

        let (head, hex) = id.as_str().rsplit_once('-').unwrap();
        prop_assert_eq!(head, prefix.as_str());
        prop_assert_eq!(hex.len(), 12);
        prop_assert!(hex.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        let decoded: Vec<u8> = (0..6)
            .map(|i| u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).unwrap())
            .collect();
        prop_assert_eq!(decoded, mac.to_vec());
    }
}

// ── Envelope completeness ────────────────────────────────────

fn reading() -> impl Strategy<Value = f32> {
    -1_000.0f32..1_000.0
}

proptest! {
    #[test]
    fn envelope_carries_every_field(
        t in reading(), h in 0.0f32..100.0,
        bpm in 0.0f32..250.0, spo2 in 0.0f32..100.0,
        a in proptest::array::uniform3(-16.0f32..16.0),
        g in proptest::array::uniform3(reading()),
        ts in 1_700_000_000i64..2_000_000_000,
    ) {
        let mut sample = SensorSample {
            climate: ClimateReading { temperature: t, humidity: h },
            pulse: PulseReading { heart_rate: bpm, spo2 },
            motion: MotionReading {
                accel: Vector3 { x: a[0], y: a[1], z: a[2] },
                gyro: Vector3 { x: g[0], y: g[1], z: g[2] },
            },
            timestamp: ts,
            ..SensorSample::default()
        };
        sample.device_id = device_id("ESP32", &[1, 2, 3, 4, 5, 6]);

        let bytes = TelemetryPublisher::new("dev/out", 512).encode(&sample).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        for field in ENVELOPE_FIELDS {
            prop_assert!(v.get(field).is_some(), "missing {}", field);
        }
        let close = |key: &str, want: f32| {
            (v[key].as_f64().unwrap() - f64::from(want)).abs() < 1e-3
        };
        prop_assert!(close("temperature", t));
        prop_assert!(close("humidity", h));
        prop_assert!(close("heartRate", bpm));
        prop_assert!(close("spO2", spo2));
        prop_assert!(close("accelX", a[0]) && close("accelY", a[1]) && close("accelZ", a[2]));
        prop_assert!(close("gyroX", g[0]) && close("gyroY", g[1]) && close("gyroZ", g[2]));
        prop_assert_eq!(v["timestamp"].as_i64(), Some(ts));
        prop_assert_eq!(v["device_id"].as_str(), Some("ESP32-010203040506"));
    }
}

// ── Routing priority ─────────────────────────────────────────

#[derive(Default)]
struct RecordingOta {
    requests: Vec<String>,
}

impl FirmwareUpdatePort for RecordingOta {
    fn on_update_request(&mut self, payload: &str) {
        self.requests.push(payload.to_owned());
    }
}

proptest! {
    /// The update topic always wins, even with the alert marker present,
    /// and the alert state is left untouched.
    #[test]
    fn update_topic_always_forwarded(
        before in "[ -~]{0,40}",
        after in "[ -~]{0,40}",
    ) {
        let router = MessageRouter::new("dev/ota", "ALERT");
        let payload = format!("{before}ALERT{after}");
        let mut alerts = AlertState::new(60_000);
        let mut ota = RecordingOta::default();

        let route = router.dispatch("dev/ota", payload.as_bytes(), &mut alerts, &mut ota, 0);
        prop_assert_eq!(route, TopicRoute::FirmwareUpdate);
        prop_assert_eq!(ota.requests, vec![payload]);
        prop_assert!(!alerts.is_active());
    }

    /// Off the update topic, the marker alone decides.
    #[test]
    fn marker_decides_other_topics(payload in "[ -~]{0,60}") {
        let router = MessageRouter::new("dev/ota", "ALERT");
        let mut alerts = AlertState::new(60_000);
        let mut ota = RecordingOta::default();

        let route = router.dispatch("dev/in", payload.as_bytes(), &mut alerts, &mut ota, 0);
        let expected = if payload.contains("ALERT") { TopicRoute::Alert } else { TopicRoute::Ignored };
        prop_assert_eq!(route, expected);
        prop_assert_eq!(alerts.is_active(), expected == TopicRoute::Alert);
        prop_assert!(ota.requests.is_empty());
    }
}

// ── OTA state machine invariants ─────────────────────────────

#[derive(Debug, Clone)]
enum OtaOp {
    Begin(u32),          // firmware_size
    Chunk(u32, Vec<u8>), // offset, data
    Finalize,
    Abort,
}

fn arb_ota_op() -> impl Strategy<Value = OtaOp> {
    prop_oneof![
        (1u32..=1024u32).prop_map(OtaOp::Begin),
        (
            0u32..=512u32,
            proptest::collection::vec(0u8..=255u8, 1..=16)
        )
            .prop_map(|(o, d)| OtaOp::Chunk(o, d)),
        Just(OtaOp::Finalize),
        Just(OtaOp::Abort),
    ]
}

proptest! {
    /// After any sequence of operations, abort() resets to Idle and a new
    /// transfer can begin.
    #[test]
    fn ota_no_stuck_states(
        ops in proptest::collection::vec(arb_ota_op(), 1..=20),
    ) {
        let mut ota = OtaManager::new();
        for op in &ops {
            match op {
                OtaOp::Begin(size) => { let _ = ota.begin(*size); }
                OtaOp::Chunk(offset, data) => { let _ = ota.write_chunk(*offset, data); }
                OtaOp::Finalize => { let _ = ota.finalize(); }
                OtaOp::Abort => ota.abort(),
            }
            prop_assert!(ota.progress_percent() <= 100);
        }

        ota.abort();
        prop_assert_eq!(ota.state(), OtaState::Idle);
        prop_assert!(ota.begin(16).is_ok());
    }

    /// Update request parsing never panics, and anything it accepts has a
    /// usable version string.
    #[test]
    fn ota_request_parse_total(payload in ".{0,80}") {
        if let Ok(req) = OtaRequest::parse(&payload) {
            prop_assert!(!req.version.is_empty());
            prop_assert!(req.version.len() <= 32);
            prop_assert!(!req.version.chars().any(char::is_whitespace));
        }
    }
}

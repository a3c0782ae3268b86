//! Whole-loop behaviour of `TelemetryService` with mock adapters.

use vitalnode::adapters::device_id::device_id;
use vitalnode::adapters::mqtt::SimSession;
use vitalnode::adapters::nvs::NvsAdapter;
use vitalnode::adapters::ota_updater::OtaUpdater;
use vitalnode::app::connection::ConnectionState;
use vitalnode::app::events::AppEvent;
use vitalnode::app::ports::{ConnectFailure, INBOX_DEPTH, SensorError, SessionError, leak_inbox};
use vitalnode::app::publisher::PublishError;
use vitalnode::app::router::TopicRoute;
use vitalnode::app::service::{TelemetryService, TickReport};
use vitalnode::app::telemetry::ENVELOPE_FIELDS;
use vitalnode::config::DeviceConfig;

use crate::mock_hw::{FakeClock, FakeOta, FakePower, FakeSensors, RecordingSink, test_config};

const MAC: [u8; 6] = [0x24, 0x0A, 0xC4, 0x01, 0x02, 0x03];

struct Rig {
    service: TelemetryService<SimSession>,
    clock: FakeClock,
    sensors: FakeSensors,
    ota: FakeOta,
    power: FakePower,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        Self::with_config(&test_config(), SimSession::new())
    }

    fn with_config(config: &DeviceConfig, session: SimSession) -> Self {
        Self {
            service: TelemetryService::new(session, config, device_id("ESP32", &MAC), leak_inbox()),
            clock: FakeClock::new(),
            sensors: FakeSensors::default(),
            ota: FakeOta::default(),
            power: FakePower::default(),
            sink: RecordingSink::default(),
        }
    }

    fn tick(&mut self) -> TickReport {
        self.service.tick(
            &mut self.clock,
            &mut self.sensors,
            &mut self.ota,
            &mut self.power,
            &mut self.sink,
        )
    }

    fn session(&mut self) -> &mut SimSession {
        self.service.connection_mut().session_mut()
    }

    /// Move the clock to the next sampling point.
    fn advance_to_sample(&mut self) {
        self.clock.advance(2_000);
    }
}

#[test]
fn first_tick_connects_without_sampling_early() {
    let mut rig = Rig::new();
    let report = rig.tick();
    assert_eq!(report.connection, ConnectionState::Connected);
    assert_eq!(report.publish, None);
    assert_eq!(report.status, "OK");
    assert_eq!(rig.sensors.pulse_updates, 1);
}

#[test]
fn due_sample_is_published_with_every_field() {
    let mut rig = Rig::new();
    rig.tick();
    rig.advance_to_sample();
    let report = rig.tick();

    let Some(Ok(len)) = report.publish else {
        panic!("expected a publish, got {:?}", report.publish);
    };
    let published = &rig.service.connection().session().published;
    assert_eq!(published.len(), 1);
    let (topic, bytes) = &published[0];
    assert_eq!(topic, "vitalnode/out");
    assert_eq!(bytes.len(), len);

    let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
    for field in ENVELOPE_FIELDS {
        assert!(v.get(field).is_some(), "missing {field}");
    }
    assert_eq!(v["device_id"], "ESP32-240AC4010203");
    assert!((v["temperature"].as_f64().unwrap() - 36.5).abs() < 1e-3);
    assert!((v["heartRate"].as_f64().unwrap() - 72.0).abs() < 1e-3);
    assert!((v["accelZ"].as_f64().unwrap() - 1.0).abs() < 1e-3);
    assert_eq!(v["timestamp"], rig.clock.epoch + 2);
    assert!(rig.sink.events.contains(&AppEvent::TelemetryPublished { bytes: len }));
}

#[test]
fn samples_are_rate_limited_but_fast_step_runs_every_tick() {
    let mut rig = Rig::new();
    rig.tick();
    let mut published_at = Vec::new();
    for _ in 0..40 {
        rig.clock.advance(250);
        if rig.tick().publish.is_some() {
            published_at.push(rig.clock.now_ms);
        }
    }
    assert_eq!(published_at, vec![2_200, 4_200, 6_200, 8_200, 10_200]);
    assert_eq!(rig.sensors.pulse_updates, 41);
    assert_eq!(rig.service.scheduler().full_samples(), 5);
    assert_eq!(rig.service.tick_count(), 41);
}

#[test]
fn inbound_alert_lands_before_same_tick_sample() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/in", b"ALERT:fall-detected");
    rig.advance_to_sample();
    let report = rig.tick();

    assert_eq!(report.routed, 1);
    assert_eq!(report.status, "ALERT:fall-detected");

    let routed = rig
        .sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::MessageRouted { route: TopicRoute::Alert, .. }));
    let published = rig
        .sink
        .events
        .iter()
        .position(|e| matches!(e, AppEvent::TelemetryPublished { .. }));
    assert!(routed.is_some());
    assert!(routed < published);
}

#[test]
fn alert_expires_after_ttl() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/in", b"ALERT:temp-high");
    assert_eq!(rig.tick().status, "ALERT:temp-high");

    rig.clock.advance(30_000);
    assert_eq!(rig.tick().status, "ALERT:temp-high");
    rig.clock.advance(31_000);
    assert_eq!(rig.tick().status, "OK");
    assert!(!rig.service.alerts().is_active());
}

#[test]
fn update_topic_wins_over_alert_marker() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/ota", b"ALERT v1.2.0");
    let report = rig.tick();
    assert_eq!(report.status, "OK");
    assert_eq!(rig.ota.requests, vec!["ALERT v1.2.0".to_string()]);
}

#[test]
fn update_payload_forwarded_verbatim() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/ota", b"v1.2.0");
    rig.tick();
    assert_eq!(rig.ota.requests, vec!["v1.2.0".to_string()]);
    assert!(!rig.service.alerts().is_active());
}

#[test]
fn unknown_messages_are_ignored() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/in", b"hello");
    let report = rig.tick();
    assert_eq!(report.routed, 1);
    assert_eq!(report.status, "OK");
    assert!(rig.ota.requests.is_empty());
}

#[test]
fn burst_beyond_inbox_depth_drops_the_overflow() {
    let mut rig = Rig::new();
    rig.tick();
    for i in 0..INBOX_DEPTH + 4 {
        rig.session().inject("vitalnode/in", format!("status {i}").as_bytes());
    }
    // The late update command does not fit either.
    rig.session().inject("vitalnode/ota", b"v1.2.0");

    assert_eq!(rig.tick().routed, INBOX_DEPTH);
    assert_eq!(rig.session().dropped, 5);
    assert!(rig.ota.requests.is_empty());

    // Nothing is held back for the next tick.
    assert_eq!(rig.tick().routed, 0);
}

#[test]
fn sensor_failure_keeps_publishing() {
    let mut rig = Rig::new();
    rig.sensors.climate = Err(SensorError::NotDetected);
    rig.sensors.pulse = Err(SensorError::Bus);
    rig.tick();
    rig.advance_to_sample();
    let report = rig.tick();
    assert!(matches!(report.publish, Some(Ok(_))));

    let (_, bytes) = &rig.service.connection().session().published[0];
    let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
    assert_eq!(v["temperature"].as_f64(), Some(0.0));
    assert!((v["accelZ"].as_f64().unwrap() - 1.0).abs() < 1e-3);
}

#[test]
fn oversized_envelope_is_skipped_entirely() {
    let config = DeviceConfig {
        max_envelope_len: 64,
        ..test_config()
    };
    let mut rig = Rig::with_config(&config, SimSession::new());
    rig.tick();
    rig.advance_to_sample();
    let report = rig.tick();
    assert!(matches!(
        report.publish,
        Some(Err(PublishError::TooLarge { max: 64, .. }))
    ));
    assert!(rig.service.connection().session().published.is_empty());
}

#[test]
fn rejected_publish_is_not_retried() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().set_reject_publishes(true);
    rig.advance_to_sample();
    assert_eq!(
        rig.tick().publish,
        Some(Err(PublishError::Transport(SessionError::Rejected)))
    );

    rig.session().set_reject_publishes(false);
    rig.clock.advance(500);
    assert_eq!(rig.tick().publish, None);
    assert!(rig.service.connection().session().published.is_empty());

    rig.advance_to_sample();
    assert!(matches!(rig.tick().publish, Some(Ok(_))));
    assert_eq!(rig.service.connection().session().published.len(), 1);
}

#[test]
fn link_loss_reconnects_on_next_tick() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().drop_link();
    let report = rig.tick();
    // Detected this tick, re-established at the start of the next.
    assert_eq!(report.connection, ConnectionState::Disconnected);
    assert_eq!(rig.tick().connection, ConnectionState::Connected);
    assert_eq!(rig.service.connection().connects(), 2);
    assert_eq!(rig.service.connection().session().handler_installs, 2);
}

#[test]
fn unauthorized_device_keeps_sampling_offline() {
    let mut session = SimSession::new();
    session.script_connects(&[Err(ConnectFailure::Unauthorized)]);
    let mut rig = Rig::with_config(&test_config(), session);

    assert_eq!(rig.tick().connection, ConnectionState::FatalUnauthorized);
    assert_eq!(rig.power.halts, 1);

    rig.advance_to_sample();
    let report = rig.tick();
    assert_eq!(
        report.publish,
        Some(Err(PublishError::Transport(SessionError::NotConnected)))
    );
    rig.tick();
    assert_eq!(rig.service.connection().session().connect_attempts, 1);
    assert_eq!(rig.sensors.pulse_updates, 3);
}

#[test]
fn healthcheck_carries_status() {
    let mut rig = Rig::new();
    rig.tick();
    rig.session().inject("vitalnode/in", b"ALERT:low-spo2");
    rig.clock.advance(30_000);
    rig.tick();
    assert!(rig.sink.events.contains(&AppEvent::Health {
        connected: true,
        status: "ALERT:low-spo2".into(),
    }));
}

#[test]
fn ota_request_end_to_end_records_version_and_restarts() {
    let mut rig = Rig::new();
    rig.tick();
    let mut updater = OtaUpdater::new(
        "1.1.1",
        NvsAdapter::new().unwrap(),
        vitalnode::adapters::power::SystemPower::new(),
    );
    rig.session().inject(
        "vitalnode/ota",
        br#"{"version":"1.2.0","url":"https://fw.example/vitalnode-1.2.0.bin"}"#,
    );
    rig.service.tick(
        &mut rig.clock,
        &mut rig.sensors,
        &mut updater,
        &mut rig.power,
        &mut rig.sink,
    );

    assert_eq!(updater.accepted().len(), 1);
    assert_eq!(updater.nvs().firmware_version().as_deref(), Some("1.2.0"));
    assert_eq!(updater.power().restarts(), 1);
}

//! Broker session lifecycle against the in-memory session.

use vitalnode::adapters::mqtt::SimSession;
use vitalnode::app::alert::AlertState;
use vitalnode::app::connection::{ConnectionManager, ConnectionState};
use vitalnode::app::events::AppEvent;
use vitalnode::app::ports::{ConnectFailure, InboundMessage, QoS, leak_inbox};
use vitalnode::config::{DeviceConfig, MIN_RETRY_DELAY_MS};

use crate::mock_hw::{FakeClock, FakePower, RecordingSink, test_config};

struct Rig {
    conn: ConnectionManager<SimSession>,
    clock: FakeClock,
    alerts: AlertState,
    power: FakePower,
    sink: RecordingSink,
}

impl Rig {
    fn with(session: SimSession, config: &DeviceConfig) -> Self {
        Self {
            conn: ConnectionManager::new(session, config, leak_inbox()),
            clock: FakeClock::new(),
            alerts: AlertState::new(config.alert_ttl_ms()),
            power: FakePower::default(),
            sink: RecordingSink::default(),
        }
    }

    fn scripted(outcomes: &[Result<(), ConnectFailure>]) -> Self {
        let mut session = SimSession::new();
        session.script_connects(outcomes);
        Self::with(session, &test_config())
    }

    fn ensure_connected(&mut self) -> ConnectionState {
        self.conn.ensure_connected(
            &mut self.clock,
            &mut self.alerts,
            &mut self.power,
            &mut self.sink,
        )
    }
}

#[test]
fn two_failures_then_success_waits_between_attempts() {
    let mut rig = Rig::scripted(&[Err(ConnectFailure::Network), Err(ConnectFailure::Timeout)]);

    assert_eq!(rig.ensure_connected(), ConnectionState::Connected);
    assert_eq!(rig.conn.attempts(), 3);
    assert_eq!(rig.conn.session().connect_attempts, 3);

    let retry_sleeps: Vec<u32> = rig
        .clock
        .sleeps
        .iter()
        .copied()
        .filter(|&s| s >= MIN_RETRY_DELAY_MS)
        .collect();
    assert_eq!(retry_sleeps.len(), 2);
    assert!(rig.clock.total_slept_ms() >= 2 * u64::from(MIN_RETRY_DELAY_MS));

    // Fresh subscriptions on both command topics, at-least-once.
    let subs = &rig.conn.session().subscriptions;
    assert_eq!(
        subs,
        &vec![
            ("vitalnode/in".to_string(), QoS::AtLeastOnce),
            ("vitalnode/ota".to_string(), QoS::AtLeastOnce),
        ]
    );
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::ConnectFailed { .. })),
        2
    );
    assert_eq!(rig.sink.events.last(), Some(&AppEvent::Connected { attempts: 3 }));
}

#[test]
fn retry_delay_never_below_minimum() {
    let config = DeviceConfig {
        retry_delay_ms: 10,
        ..test_config()
    };
    let mut session = SimSession::new();
    session.script_connects(&[Err(ConnectFailure::ServerUnavailable)]);
    let mut rig = Rig::with(session, &config);

    rig.ensure_connected();
    assert_eq!(rig.clock.sleeps.first(), Some(&MIN_RETRY_DELAY_MS));
}

#[test]
fn failure_code_is_shown_as_alert() {
    let mut rig = Rig::scripted(&[Err(ConnectFailure::Network)]);
    rig.ensure_connected();
    assert_eq!(rig.alerts.query(rig.clock.now_ms), "MQTT error: -2");
    // The alert was raised at the failed attempt (t = 0).
    assert_eq!(rig.alerts.raised_at(), Some(0));
}

#[test]
fn unauthorized_halts_and_never_retries() {
    let mut rig = Rig::scripted(&[Err(ConnectFailure::Unauthorized)]);

    assert_eq!(rig.ensure_connected(), ConnectionState::FatalUnauthorized);
    assert_eq!(rig.power.halts, 1);

    for _ in 0..5 {
        assert_eq!(rig.ensure_connected(), ConnectionState::FatalUnauthorized);
        assert!(rig.conn.maintain(&mut rig.sink).is_empty());
    }
    assert_eq!(rig.conn.session().connect_attempts, 1);
    assert_eq!(rig.power.halts, 1);
    assert!(rig.clock.sleeps.is_empty());
    assert_eq!(
        rig.sink.count(|e| *e == AppEvent::FatalUnauthorized),
        1
    );
}

#[test]
fn bad_credentials_are_not_fatal() {
    let mut rig = Rig::scripted(&[Err(ConnectFailure::BadCredentials)]);
    assert_eq!(rig.ensure_connected(), ConnectionState::Connected);
    assert_eq!(rig.power.halts, 0);
}

#[test]
fn handler_reinstalled_after_reconnect() {
    let mut rig = Rig::scripted(&[]);
    rig.ensure_connected();
    assert_eq!(rig.conn.session().handler_installs, 1);

    rig.conn.session_mut().drop_link();
    assert!(rig.conn.maintain(&mut rig.sink).is_empty());
    assert_eq!(rig.conn.state(), ConnectionState::Disconnected);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::ConnectionLost), 1);

    assert_eq!(rig.ensure_connected(), ConnectionState::Connected);
    assert_eq!(rig.conn.session().handler_installs, 2);
    assert!(rig.conn.session().has_handler());
    assert_eq!(rig.conn.connects(), 2);

    // Messages flow again through the new handler.
    rig.conn.session_mut().inject("vitalnode/in", b"ALERT:fall");
    let got = rig.conn.maintain(&mut rig.sink);
    assert_eq!(got, vec![InboundMessage::new("vitalnode/in", b"ALERT:fall").unwrap()]);
}

#[test]
fn inbound_messages_keep_arrival_order() {
    let mut rig = Rig::scripted(&[]);
    rig.ensure_connected();
    for p in [&b"one"[..], b"two", b"three"] {
        rig.conn.session_mut().inject("vitalnode/in", p);
    }
    let payloads: Vec<Vec<u8>> = rig
        .conn
        .maintain(&mut rig.sink)
        .into_iter()
        .map(|m| m.payload.to_vec())
        .collect();
    assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[test]
fn failed_loop_step_keeps_session() {
    let mut rig = Rig::scripted(&[]);
    rig.ensure_connected();
    rig.conn.session_mut().fail_next_poll();
    rig.conn.maintain(&mut rig.sink);
    assert!(rig.conn.is_connected());
}

#[test]
fn shared_command_and_update_topic_subscribed_once() {
    let config = DeviceConfig {
        firmware_update_topic: "vitalnode/in".into(),
        ..test_config()
    };
    let mut rig = Rig::with(SimSession::new(), &config);
    rig.ensure_connected();
    assert_eq!(rig.conn.session().subscriptions.len(), 1);
    // Drain passes still run.
    assert_eq!(rig.clock.sleeps, vec![config.drain_pass_ms; usize::from(config.drain_passes)]);
}

#[test]
fn self_test_echo_arrives_through_handler() {
    let mut rig = Rig::scripted(&[]);
    rig.ensure_connected();
    assert!(rig.conn.self_test(&mut rig.clock));
    let got = rig.conn.maintain(&mut rig.sink);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].topic, "vitalnode/in");
    assert_eq!(got[0].payload.as_slice(), &b"TEST_MESSAGE_FROM_SELF"[..]);
}

#[test]
fn self_test_requires_session() {
    let mut rig = Rig::scripted(&[]);
    assert!(!rig.conn.self_test(&mut rig.clock));
}

#[test]
fn healthcheck_reports_link_state() {
    let mut rig = Rig::scripted(&[]);
    rig.ensure_connected();
    let report = rig.conn.healthcheck(30_000).map(|r| r.connected);
    assert_eq!(report, Some(true));

    rig.conn.session_mut().drop_link();
    assert_eq!(rig.conn.healthcheck(45_000), None);
    assert_eq!(rig.conn.healthcheck(60_000).map(|r| r.connected), Some(false));
}

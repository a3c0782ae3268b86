//! Broker session lifecycle.
//!
//! ```text
//!            ensure_connected()            maintain(): link lost
//!  Disconnected ──────────▶ Connecting ──────▶ Connected ─────────┐
//!       ▲                      │  │                               │
//!       └──── retry delay ─────┘  └── unauthorized ──▶ FatalUnauthorized
//!       └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ConnectionManager`] exclusively owns the session handle.  Connecting is
//! a blocking retry loop with a fixed delay between attempts; it only gives
//! up when the broker reports unauthorized credentials, which halts the
//! device until an external reset.

use log::{error, info, warn};

use crate::config::DeviceConfig;

use super::alert::AlertState;
use super::events::AppEvent;
use super::ports::{
    Clock, ConnectParams, EventSink, Inbox, InboundMessage, PowerPort, QoS, SessionPort,
};

/// Self-test drain windows (count × milliseconds).
const SELF_TEST_PASSES: u8 = 10;
const SELF_TEST_PASS_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: only a process restart leaves this state.
    FatalUnauthorized,
}

/// Result of one healthcheck period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub connected: bool,
    pub at_ms: u64,
}

/// Periodic, side-effect-free report of session validity.
#[derive(Debug, Clone)]
pub struct HealthcheckTimer {
    interval_ms: u64,
    last_ms: u64,
}

impl HealthcheckTimer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: 0,
        }
    }

    /// Returns a report once per interval.
    pub fn tick(&mut self, now_ms: u64, connected: bool) -> Option<HealthReport> {
        if now_ms.saturating_sub(self.last_ms) < self.interval_ms {
            return None;
        }
        self.last_ms = now_ms;
        info!(
            "Healthcheck: MQTT {}",
            if connected { "UP" } else { "DOWN" }
        );
        Some(HealthReport {
            connected,
            at_ms: now_ms,
        })
    }
}

pub struct ConnectionManager<S> {
    session: S,
    state: ConnectionState,
    inbox: &'static Inbox,
    health: HealthcheckTimer,

    broker_host: String,
    broker_port: u16,
    username: String,
    password: String,
    client_id: String,
    subscribe_topic: String,
    firmware_update_topic: String,
    firmware_version: String,
    buffer_len: usize,
    retry_delay_ms: u32,
    drain_passes: u8,
    drain_pass_ms: u32,

    /// Connect attempts since boot.
    attempts: u32,
    /// Successful connects since boot.
    connects: u32,
}

impl<S: SessionPort> ConnectionManager<S> {
    /// `inbox` receives everything the session delivers; the manager is its
    /// only consumer.
    pub fn new(session: S, config: &DeviceConfig, inbox: &'static Inbox) -> Self {
        Self {
            session,
            state: ConnectionState::Disconnected,
            inbox,
            health: HealthcheckTimer::new(u64::from(config.healthcheck_interval_ms)),
            broker_host: config.broker_host.clone(),
            broker_port: config.broker_port,
            username: config.username.clone(),
            password: config.password.clone(),
            client_id: config.client_id.clone(),
            subscribe_topic: config.subscribe_topic.clone(),
            firmware_update_topic: config.firmware_update_topic.clone(),
            firmware_version: config.firmware_version.clone(),
            buffer_len: config.inbound_buffer_len,
            retry_delay_ms: config.retry_delay_ms.max(crate::config::MIN_RETRY_DELAY_MS),
            drain_passes: config.drain_passes,
            drain_pass_ms: config.drain_pass_ms,
            attempts: 0,
            connects: 0,
        }
    }

    /// Firmware version logged after each connect (e.g. the NVS record).
    pub fn set_firmware_version(&mut self, version: &str) {
        version.clone_into(&mut self.firmware_version);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn connects(&self) -> u32 {
        self.connects
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Borrow the session for publishing.  Only meaningful while connected.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Block until connected, or until the broker reports unauthorized.
    ///
    /// Non-fatal failures raise a `MQTT error: <code>` alert and wait the
    /// retry delay before the next attempt; this loop has no attempt limit.
    pub fn ensure_connected(
        &mut self,
        clock: &mut impl Clock,
        alerts: &mut AlertState,
        power: &mut impl PowerPort,
        sink: &mut impl EventSink,
    ) -> ConnectionState {
        match self.state {
            ConnectionState::Connected | ConnectionState::FatalUnauthorized => return self.state,
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }

        loop {
            self.state = ConnectionState::Connecting;
            self.attempts += 1;
            self.log_attempt();

            let params = ConnectParams {
                client_id: &self.client_id,
                username: &self.username,
                password: &self.password,
            };
            match self.session.connect(&params) {
                Ok(()) => {
                    self.on_connected(clock);
                    sink.emit(&AppEvent::Connected {
                        attempts: self.attempts,
                    });
                    return self.state;
                }
                Err(failure) if failure.is_fatal() => {
                    error!(
                        "MQTT: broker refused credentials ({}), halting network activity",
                        failure
                    );
                    self.state = ConnectionState::FatalUnauthorized;
                    sink.emit(&AppEvent::FatalUnauthorized);
                    power.halt();
                    return self.state;
                }
                Err(failure) => {
                    warn!(
                        "MQTT: connect failed, {}; check broker settings, retrying in {} ms",
                        failure, self.retry_delay_ms
                    );
                    alerts.raise(&format!("MQTT error: {}", failure.code()), clock.now_ms());
                    sink.emit(&AppEvent::ConnectFailed { failure });
                    self.state = ConnectionState::Disconnected;
                    clock.sleep_ms(self.retry_delay_ms);
                }
            }
        }
    }

    /// Per-tick upkeep while connected: run the transport loop, detect a
    /// dropped link, and return every inbound message received since the
    /// last call, oldest first.
    pub fn maintain(&mut self, sink: &mut impl EventSink) -> Vec<InboundMessage> {
        if self.state == ConnectionState::Connected {
            let ok = self.session.poll();
            if !self.session.is_connected() {
                warn!("MQTT: connection lost, will reconnect");
                self.state = ConnectionState::Disconnected;
                sink.emit(&AppEvent::ConnectionLost);
            } else if !ok {
                warn!("MQTT: loop step failed while connected");
            }
        }
        let mut received = Vec::new();
        while let Ok(msg) = self.inbox.try_receive() {
            received.push(msg);
        }
        received
    }

    /// Healthcheck sub-behaviour; reports at most once per interval.
    pub fn healthcheck(&mut self, now_ms: u64) -> Option<HealthReport> {
        let connected = self.is_connected() && self.session.is_connected();
        self.health.tick(now_ms, connected)
    }

    /// Diagnostic: publish a test message to our own command topic and pump the
    /// transport long enough to see it come back through the handler.
    pub fn self_test(&mut self, clock: &mut impl Clock) -> bool {
        if !self.is_connected() {
            warn!("MQTT self-test: not connected");
            return false;
        }
        info!("MQTT self-test: publishing test message to '{}'", self.subscribe_topic);
        let published = self
            .session
            .publish(&self.subscribe_topic, b"TEST_MESSAGE_FROM_SELF")
            .is_ok();
        if !published {
            warn!("MQTT self-test: test publish failed");
        }
        for _ in 0..SELF_TEST_PASSES {
            self.session.poll();
            clock.sleep_ms(SELF_TEST_PASS_MS);
        }
        published
    }

    // ── Internal ──────────────────────────────────────────────

    fn log_attempt(&self) {
        info!(
            "MQTT: attempt {} server={} port={} user={} client_id={} buffer={}",
            self.attempts,
            self.broker_host,
            self.broker_port,
            self.username,
            self.client_id,
            self.buffer_len
        );
    }

    fn on_connected(&mut self, clock: &mut impl Clock) {
        self.state = ConnectionState::Connected;
        self.connects += 1;
        info!("MQTT: connected (attempt {})", self.attempts);

        // Transports may drop the handler across reconnects.
        self.session.set_handler(self.inbox.sender());
        info!("MQTT: message handler installed");
        info!("MQTT: firmware {}", self.firmware_version);

        let mut topics = vec![self.subscribe_topic.clone()];
        if self.firmware_update_topic != self.subscribe_topic {
            topics.push(self.firmware_update_topic.clone());
        }

        let mut passes = 0u8;
        for topic in &topics {
            match self.session.subscribe(topic, QoS::AtLeastOnce) {
                Ok(()) => info!("MQTT: subscribed to '{}'", topic),
                Err(e) => warn!("MQTT: subscribe to '{}' failed ({})", topic, e),
            }
            if passes < self.drain_passes {
                self.drain_pass(clock);
                passes += 1;
            }
        }
        while passes < self.drain_passes {
            self.drain_pass(clock);
            passes += 1;
        }
        info!("MQTT: ready for messages");
    }

    fn drain_pass(&mut self, clock: &mut impl Clock) {
        self.session.poll();
        clock.sleep_ms(self.drain_pass_ms);
    }
}

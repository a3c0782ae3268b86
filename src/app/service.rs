//! Application service, the hexagonal core.
//!
//! [`TelemetryService`] owns the connection manager, router, scheduler,
//! publisher and alert state.  All I/O flows through port traits passed
//! in at call sites, making the whole loop testable with mock adapters.
//!
//! ```text
//!  Clock ───────▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  SensorPort ──▶ │       TelemetryService        │ ──▶ FirmwareUpdatePort
//!  SessionPort ◀─▶│ Connection · Router · Sampler │ ──▶ PowerPort
//!                 └──────────────────────────────┘
//! ```
//!
//! One [`tick`](TelemetryService::tick) runs, in order: ensure connected →
//! drain and route inbound commands → scheduler → publish → status query →
//! healthcheck.  Inbound commands therefore always land before the sample
//! of the same tick goes out.

use log::{info, warn};

use crate::adapters::device_id::DeviceIdString;
use crate::config::DeviceConfig;
use crate::scheduler::{MeasurementScheduler, TickOutcome};

use super::alert::AlertState;
use super::connection::{ConnectionManager, ConnectionState};
use super::events::AppEvent;
use super::ports::{
    Clock, EventSink, FirmwareUpdatePort, Inbox, PowerPort, SensorPort, SessionError, SessionPort,
};
use super::publisher::{PublishError, TelemetryPublisher};
use super::router::MessageRouter;
use super::telemetry::SensorSample;

/// Summary of one loop tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub connection: ConnectionState,
    /// Inbound messages routed this tick.
    pub routed: usize,
    /// `None` when no sample was due.
    pub publish: Option<Result<usize, PublishError>>,
    /// Operator status text (alert or "OK").
    pub status: String,
}

pub struct TelemetryService<S> {
    conn: ConnectionManager<S>,
    router: MessageRouter,
    publisher: TelemetryPublisher,
    scheduler: MeasurementScheduler,
    alerts: AlertState,
    tick_count: u64,
}

impl<S: SessionPort> TelemetryService<S> {
    pub fn new(
        session: S,
        config: &DeviceConfig,
        device_id: DeviceIdString,
        inbox: &'static Inbox,
    ) -> Self {
        info!("TelemetryService: device {}", device_id);
        Self {
            conn: ConnectionManager::new(session, config, inbox),
            router: MessageRouter::new(&config.firmware_update_topic, &config.alert_marker),
            publisher: TelemetryPublisher::new(&config.publish_topic, config.max_envelope_len),
            scheduler: MeasurementScheduler::new(config.measure_interval_ms(), device_id),
            alerts: AlertState::new(config.alert_ttl_ms()),
            tick_count: 0,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one main-loop iteration.  May block inside the reconnect loop.
    pub fn tick(
        &mut self,
        clock: &mut impl Clock,
        sensors: &mut impl SensorPort,
        firmware: &mut impl FirmwareUpdatePort,
        power: &mut impl PowerPort,
        sink: &mut impl EventSink,
    ) -> TickReport {
        self.tick_count += 1;

        // 1. Session (a fatal refusal leaves it down for good)
        self.conn
            .ensure_connected(clock, &mut self.alerts, power, sink);

        // 2. Inbound commands
        let inbound = self.conn.maintain(sink);
        let routed = inbound.len();
        for msg in inbound {
            let route = self.router.dispatch(
                &msg.topic,
                &msg.payload,
                &mut self.alerts,
                firmware,
                clock.now_ms(),
            );
            sink.emit(&AppEvent::MessageRouted {
                topic: msg.topic,
                route,
            });
        }

        // 3. Sampling
        let now = clock.now_ms();
        let publish = match self.scheduler.tick(now, clock.unix_time(), sensors) {
            TickOutcome::FullSample(sample) => Some(self.publish(&sample, sink)),
            TickOutcome::NoSample => None,
        };

        // 4. Status + healthcheck
        let status = self.alerts.query(now).to_owned();
        if let Some(report) = self.conn.healthcheck(now) {
            sink.emit(&AppEvent::Health {
                connected: report.connected,
                status: status.clone(),
            });
        }

        TickReport {
            connection: self.conn.state(),
            routed,
            publish,
            status,
        }
    }

    fn publish(
        &mut self,
        sample: &SensorSample,
        sink: &mut impl EventSink,
    ) -> Result<usize, PublishError> {
        let result = if self.conn.is_connected() {
            self.publisher.publish(sample, self.conn.session_mut())
        } else {
            warn!("Publish: no session, sample dropped");
            Err(PublishError::Transport(SessionError::NotConnected))
        };
        match result {
            Ok(bytes) => sink.emit(&AppEvent::TelemetryPublished { bytes }),
            Err(e) => sink.emit(&AppEvent::PublishFailed(e)),
        }
        result
    }

    // ── Queries ───────────────────────────────────────────────

    /// Operator status text: the live alert, or "OK".
    pub fn status(&mut self, now_ms: u64) -> &str {
        self.alerts.query(now_ms)
    }

    pub fn connection(&self) -> &ConnectionManager<S> {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<S> {
        &mut self.conn
    }

    pub fn alerts(&self) -> &AlertState {
        &self.alerts
    }

    pub fn scheduler(&self) -> &MeasurementScheduler {
        &self.scheduler
    }

    /// Total loop ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

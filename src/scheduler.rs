//! Two-rate measurement scheduler.
//!
//! ```text
//!   every tick ──▶ fast_update()  (pulse-oximeter FIFO + beat detection)
//!                       │
//!   now - last >= I ──▶ full_sample() ──▶ SensorSample ──▶ publisher
//! ```
//!
//! Beat detection needs near-continuous sampling, the other sensors only
//! periodic reads.  The two steps are independently invokable; [`tick`]
//! composes them so the fast step runs exactly once per tick whatever the
//! outcome.
//!
//! [`tick`]: MeasurementScheduler::tick

use log::{info, warn};

use crate::adapters::device_id::DeviceIdString;
use crate::app::ports::SensorPort;
use crate::app::telemetry::SensorSample;

/// What one scheduler tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    FullSample(SensorSample),
    NoSample,
}

pub struct MeasurementScheduler {
    interval_ms: u64,
    last_full_sample_at: u64,
    /// Field values carried across ticks; a failed read keeps the old value.
    current: SensorSample,
    full_samples: u64,
    fast_updates: u64,
}

impl MeasurementScheduler {
    pub fn new(interval_ms: u64, device_id: DeviceIdString) -> Self {
        info!("Scheduler: full sample every {} ms", interval_ms);
        Self {
            interval_ms,
            last_full_sample_at: 0,
            current: SensorSample {
                device_id,
                ..SensorSample::default()
            },
            full_samples: 0,
            fast_updates: 0,
        }
    }

    /// Whether a full sample is due at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_full_sample_at) >= self.interval_ms
    }

    /// Run one scheduler tick.
    pub fn tick(
        &mut self,
        now_ms: u64,
        unix_time: i64,
        sensors: &mut impl SensorPort,
    ) -> TickOutcome {
        if self.is_due(now_ms) {
            TickOutcome::FullSample(self.full_sample(now_ms, unix_time, sensors))
        } else {
            self.fast_update(now_ms, sensors);
            TickOutcome::NoSample
        }
    }

    /// Fast continuous-update step.
    pub fn fast_update(&mut self, now_ms: u64, sensors: &mut impl SensorPort) {
        sensors.update_pulse(now_ms);
        self.fast_updates += 1;
    }

    /// Full multi-sensor read.  Includes the fast step so the pulse
    /// oximeter is serviced on sampling ticks too.
    pub fn full_sample(
        &mut self,
        now_ms: u64,
        unix_time: i64,
        sensors: &mut impl SensorPort,
    ) -> SensorSample {
        self.last_full_sample_at = now_ms;

        match sensors.read_climate() {
            Ok(c) => self.current.climate = c,
            Err(e) => warn!("Scheduler: climate read failed ({}), keeping last value", e),
        }

        self.fast_update(now_ms, sensors);
        match sensors.read_pulse() {
            Ok(p) => self.current.pulse = p,
            Err(e) => warn!("Scheduler: pulse read failed ({}), keeping last value", e),
        }

        match sensors.read_motion() {
            Ok(m) => self.current.motion = m,
            Err(e) => warn!("Scheduler: motion read failed ({}), keeping last value", e),
        }

        self.current.timestamp = unix_time;
        self.full_samples += 1;
        self.current.clone()
    }

    pub fn last_full_sample_at(&self) -> u64 {
        self.last_full_sample_at
    }

    pub fn full_samples(&self) -> u64 {
        self.full_samples
    }

    pub fn fast_updates(&self) -> u64 {
        self.fast_updates
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

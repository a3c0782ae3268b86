//! Sensor subsystem: individual drivers and the aggregating [`SensorHub`].
//!
//! All three sensors share one I²C bus.  The hub owns the bus and hands it
//! to each driver per call, and implements [`SensorPort`] for the
//! scheduler.
//!
//! | Driver     | Address | Provides                   | Init failure |
//! |------------|---------|----------------------------|--------------|
//! | `sht21`    | 0x40    | temperature, humidity      | logged       |
//! | `max30100` | 0x57    | heart rate, SpO2           | fatal        |
//! | `mpu6050`  | 0x68    | acceleration, angular rate | fatal        |

pub mod max30100;
pub mod mpu6050;
pub mod sht21;

use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::app::ports::{SensorError, SensorPort};
use crate::app::telemetry::{ClimateReading, MotionReading, PulseReading};
use crate::error::{Error, Result};
use max30100::Max30100;
use mpu6050::Mpu6050;
use sht21::Sht21;

/// Aggregates all sensor drivers behind a single bus.
pub struct SensorHub<I> {
    bus: I,
    climate: Sht21,
    pulse: Max30100,
    motion: Mpu6050,
    pulse_errors: u32,
}

impl<I: I2c> SensorHub<I> {
    pub fn new(bus: I) -> Self {
        Self {
            bus,
            climate: Sht21::new(),
            pulse: Max30100::new(),
            motion: Mpu6050::new(),
            pulse_errors: 0,
        }
    }

    /// Bring up every sensor.
    ///
    /// The climate sensor is optional: its failure is logged and its reads
    /// fail later.  The pulse oximeter and motion sensor are required.
    pub fn init(&mut self) -> Result<()> {
        match self.climate.init(&mut self.bus) {
            Ok(()) => info!("Sensors: SHT21 init ok"),
            Err(e) => warn!("Sensors: SHT21 init failed ({}), continuing without it", e),
        }

        self.pulse.begin(&mut self.bus).map_err(|e| {
            warn!("Sensors: MAX30100 init failed ({})", e);
            Error::Init("MAX30100 not responding")
        })?;

        self.motion.init(&mut self.bus).map_err(|e| {
            warn!("Sensors: MPU6050 connection test failed ({})", e);
            Error::Init("MPU6050 connection test failed")
        })?;

        info!("Sensors: all required sensors ready");
        Ok(())
    }

    /// FIFO/bus errors seen by the fast pulse step since boot.
    pub fn pulse_errors(&self) -> u32 {
        self.pulse_errors
    }

    pub fn release(self) -> I {
        self.bus
    }
}

impl<I: I2c> SensorPort for SensorHub<I> {
    fn read_climate(&mut self) -> core::result::Result<ClimateReading, SensorError> {
        self.climate.read(&mut self.bus)
    }

    fn read_pulse(&mut self) -> core::result::Result<PulseReading, SensorError> {
        if !self.pulse.is_ready() {
            return Err(SensorError::NotDetected);
        }
        Ok(self.pulse.reading())
    }

    fn read_motion(&mut self) -> core::result::Result<MotionReading, SensorError> {
        self.motion.read(&mut self.bus)
    }

    fn update_pulse(&mut self, now_ms: u64) {
        if let Err(e) = self.pulse.update(&mut self.bus, now_ms) {
            // Runs every tick; keep the log quiet.
            self.pulse_errors += 1;
            debug!("Sensors: MAX30100 update failed ({})", e);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Test bus
// ═══════════════════════════════════════════════════════════════


#[cfg(test)]
mod tests {
    use super::fake_bus::FakeBus;
    use super::*;

    fn healthy_bus() -> FakeBus {
        let mut bus = FakeBus::new();
        bus.set_reg(max30100::ADDRESS, 0xFF, 0x11);
        bus.set_reg(mpu6050::ADDRESS, 0x75, 0x68);
        bus
    }

    #[test]
    fn init_succeeds_without_climate_sensor() {
        let mut bus = healthy_bus();
        bus.remove(sht21::ADDRESS);
        let mut hub = SensorHub::new(bus);
        assert!(hub.init().is_ok());
        assert_eq!(hub.read_climate(), Err(SensorError::NotDetected));
        assert!(hub.read_motion().is_ok());
    }

    #[test]
    fn missing_pulse_oximeter_is_fatal() {
        let mut bus = healthy_bus();
        bus.remove(max30100::ADDRESS);
        let mut hub = SensorHub::new(bus);
        assert!(matches!(hub.init(), Err(Error::Init(_))));
    }

    #[test]
    fn failed_motion_test_is_fatal() {
        let mut bus = healthy_bus();
        bus.set_reg(mpu6050::ADDRESS, 0x75, 0x00);
        let mut hub = SensorHub::new(bus);
        assert_eq!(
            hub.init(),
            Err(Error::Init("MPU6050 connection test failed"))
        );
    }

    #[test]
    fn fast_step_counts_bus_errors() {
        let mut hub = SensorHub::new(healthy_bus());
        hub.init().unwrap();
        hub.update_pulse(10);
        assert_eq!(hub.pulse_errors(), 0);

        let mut bus = hub.release();
        bus.remove(max30100::ADDRESS);
        let mut hub = SensorHub::new(bus);
        hub.update_pulse(20);
        assert_eq!(hub.pulse_errors(), 1);
        assert_eq!(hub.read_pulse(), Err(SensorError::NotDetected));
    }
}

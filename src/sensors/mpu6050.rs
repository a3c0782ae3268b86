//! MPU6050 accelerometer / gyroscope (I²C, address 0x68).
//!
//! Configured for ±2 g and ±250 °/s full scale; one 14-byte burst from
//! ACCEL_XOUT_H returns all six axes (temperature word in the middle).

use embedded_hal::i2c::I2c;
use log::info;

use crate::app::ports::SensorError;
use crate::app::telemetry::{MotionReading, Vector3};

pub const ADDRESS: u8 = 0x68;

const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x68;
const PWR_CLOCK_PLL_X: u8 = 0x01;
const ACCEL_FS_2G: u8 = 0x00;
const GYRO_FS_250: u8 = 0x00;

/// LSB per g at ±2 g.
pub const ACCEL_LSB_PER_G: f32 = 16_384.0;
/// LSB per °/s at ±250 °/s.
pub const GYRO_LSB_PER_DPS: f32 = 131.0;

pub fn accel_g(raw: i16) -> f32 {
    f32::from(raw) / ACCEL_LSB_PER_G
}

pub fn gyro_dps(raw: i16) -> f32 {
    f32::from(raw) / GYRO_LSB_PER_DPS
}

/// Decode the 14-byte ACCEL_XOUT_H burst.
pub fn decode_motion(frame: &[u8; 14]) -> MotionReading {
    let word = |i: usize| i16::from_be_bytes([frame[i], frame[i + 1]]);
    MotionReading {
        accel: Vector3 {
            x: accel_g(word(0)),
            y: accel_g(word(2)),
            z: accel_g(word(4)),
        },
        gyro: Vector3 {
            x: gyro_dps(word(8)),
            y: gyro_dps(word(10)),
            z: gyro_dps(word(12)),
        },
    }
}

#[derive(Debug, Default)]
pub struct Mpu6050 {
    ready: bool,
}

impl Mpu6050 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the device, verify WHO_AM_I and set the full-scale ranges.
    pub fn init<I: I2c>(&mut self, bus: &mut I) -> Result<(), SensorError> {
        let mut who = [0u8; 1];
        bus.write_read(ADDRESS, &[REG_WHO_AM_I], &mut who)
            .map_err(|_| SensorError::NotDetected)?;
        if who[0] & 0x7E != WHO_AM_I_VALUE {
            return Err(SensorError::NotDetected);
        }

        for (reg, value) in [
            (REG_PWR_MGMT_1, PWR_CLOCK_PLL_X),
            (REG_ACCEL_CONFIG, ACCEL_FS_2G),
            (REG_GYRO_CONFIG, GYRO_FS_250),
        ] {
            bus.write(ADDRESS, &[reg, value])
                .map_err(|_| SensorError::Bus)?;
        }
        self.ready = true;
        info!("MPU6050: ready (±2 g, ±250 °/s)");
        Ok(())
    }

    pub fn read<I: I2c>(&mut self, bus: &mut I) -> Result<MotionReading, SensorError> {
        if !self.ready {
            return Err(SensorError::NotDetected);
        }
        let mut frame = [0u8; 14];
        bus.write_read(ADDRESS, &[REG_ACCEL_XOUT_H], &mut frame)
            .map_err(|_| SensorError::Bus)?;
        Ok(decode_motion(&frame))
    }
}

//! Sensor readings, the per-interval sample, and its wire envelope.

use serde::{Deserialize, Serialize};

use crate::adapters::device_id::DeviceIdString;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClimateReading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Relative humidity, percent
    pub humidity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseReading {
    /// Beats per minute
    pub heart_rate: f32,
    /// Oxygen saturation, percent
    pub spo2: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
    /// Acceleration in g
    pub accel: Vector3,
    /// Angular rate in °/s
    pub gyro: Vector3,
}

/// One full multi-sensor sample.  Built once per measurement interval and
/// consumed by the publisher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSample {
    pub climate: ClimateReading,
    pub pulse: PulseReading,
    pub motion: MotionReading,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub device_id: DeviceIdString,
}

/// Published telemetry payload.  Field names are part of the broker contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope<'a> {
    pub temperature: f32,
    pub humidity: f32,
    #[serde(rename = "heartRate")]
    pub heart_rate: f32,
    #[serde(rename = "spO2")]
    pub spo2: f32,
    #[serde(rename = "accelX")]
    pub accel_x: f32,
    #[serde(rename = "accelY")]
    pub accel_y: f32,
    #[serde(rename = "accelZ")]
    pub accel_z: f32,
    #[serde(rename = "gyroX")]
    pub gyro_x: f32,
    #[serde(rename = "gyroY")]
    pub gyro_y: f32,
    #[serde(rename = "gyroZ")]
    pub gyro_z: f32,
    pub timestamp: i64,
    #[serde(borrow)]
    pub device_id: &'a str,
}

impl<'a> From<&'a SensorSample> for TelemetryEnvelope<'a> {
    fn from(s: &'a SensorSample) -> Self {
        Self {
            temperature: s.climate.temperature,
            humidity: s.climate.humidity,
            heart_rate: s.pulse.heart_rate,
            spo2: s.pulse.spo2,
            accel_x: s.motion.accel.x,
            accel_y: s.motion.accel.y,
            accel_z: s.motion.accel.z,
            gyro_x: s.motion.gyro.x,
            gyro_y: s.motion.gyro.y,
            gyro_z: s.motion.gyro.z,
            timestamp: s.timestamp,
            device_id: s.device_id.as_str(),
        }
    }
}

/// Every key a published envelope carries.
pub const ENVELOPE_FIELDS: [&str; 12] = [
    "temperature",
    "humidity",
    "heartRate",
    "spO2",
    "accelX",
    "accelY",
    "accelZ",
    "gyroX",
    "gyroY",
    "gyroZ",
    "timestamp",
    "device_id",
];

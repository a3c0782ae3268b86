//! SHT21 temperature / relative-humidity sensor (I²C, address 0x40).
//!
//! Uses the hold-master measurement commands: the sensor stretches SCL
//! until the conversion is done, so a read is a single write-read
//! transaction.  Every frame is two data bytes plus a CRC-8 (poly 0x31).

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::SensorError;
use crate::app::telemetry::ClimateReading;

pub const ADDRESS: u8 = 0x40;

const CMD_TEMP_HOLD: u8 = 0xE3;
const CMD_RH_HOLD: u8 = 0xE5;
const CMD_READ_USER_REG: u8 = 0xE7;

/// CRC-8 as specified for the SHT2x family (x⁸ + x⁵ + x⁴ + 1, init 0).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Raw temperature ticks → °C.  The two status bits are masked off.
pub fn temperature_c(raw: u16) -> f32 {
    -46.85 + 175.72 * f32::from(raw & !0x0003) / 65_536.0
}

/// Raw humidity ticks → %RH.
pub fn humidity_pct(raw: u16) -> f32 {
    -6.0 + 125.0 * f32::from(raw & !0x0003) / 65_536.0
}

#[derive(Debug, Default)]
pub struct Sht21 {
    present: bool,
}

impl Sht21 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Probe the sensor by reading its user register.
    pub fn init<I: I2c>(&mut self, bus: &mut I) -> Result<(), SensorError> {
        let mut reg = [0u8; 1];
        bus.write_read(ADDRESS, &[CMD_READ_USER_REG], &mut reg)
            .map_err(|_| SensorError::NotDetected)?;
        self.present = true;
        info!("SHT21: detected (user register 0x{:02X})", reg[0]);
        Ok(())
    }

    pub fn read<I: I2c>(&mut self, bus: &mut I) -> Result<ClimateReading, SensorError> {
        if !self.present {
            return Err(SensorError::NotDetected);
        }
        let t = Self::measure(bus, CMD_TEMP_HOLD)?;
        let rh = Self::measure(bus, CMD_RH_HOLD)?;
        Ok(ClimateReading {
            temperature: temperature_c(t),
            humidity: humidity_pct(rh),
        })
    }

    fn measure<I: I2c>(bus: &mut I, cmd: u8) -> Result<u16, SensorError> {
        let mut frame = [0u8; 3];
        bus.write_read(ADDRESS, &[cmd], &mut frame)
            .map_err(|_| SensorError::Bus)?;
        if crc8(&frame[..2]) != frame[2] {
            warn!("SHT21: CRC mismatch on command 0x{:02X}", cmd);
            return Err(SensorError::Crc);
        }
        Ok(u16::from_be_bytes([frame[0], frame[1]]))
    }
}

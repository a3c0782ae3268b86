//! GPIO / peripheral assignments for the VitalNode board.
//!
//! Single source of truth for the wiring; `main` logs these at boot.

// ---------------------------------------------------------------------------
// Sensor bus (SHT21, MAX30100, MPU6050 share I2C0)
// ---------------------------------------------------------------------------

/// I2C0 data line (ESP32 default SDA).
pub const I2C_SDA_GPIO: i32 = 21;
/// I2C0 clock line (ESP32 default SCL).
pub const I2C_SCL_GPIO: i32 = 22;
/// Bus clock (standard mode).
pub const I2C_FREQ_HZ: u32 = 100_000;

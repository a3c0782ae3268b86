//! Low-level drivers that talk to the ESP-IDF runtime directly.

pub mod watchdog;

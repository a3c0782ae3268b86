//! Application core: pure domain logic, zero I/O.
//!
//! Session lifecycle, inbound command routing, the timed alert, telemetry
//! encoding and the per-tick orchestration live here.  All interaction
//! with hardware and the network happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without a broker or
//! real sensors.

pub mod alert;
pub mod connection;
pub mod events;
pub mod ports;
pub mod publisher;
pub mod router;
pub mod service;
pub mod telemetry;

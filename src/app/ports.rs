//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TelemetryService (domain)
//! ```
//!
//! Driven adapters (broker session, clock, sensors, OTA, power, storage,
//! event sinks) implement these traits.  The
//! [`TelemetryService`](super::service::TelemetryService) consumes them via
//! generics, so the domain core never touches hardware directly.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Sender};

use super::telemetry::{ClimateReading, MotionReading, PulseReading};

// ───────────────────────────────────────────────────────────────
// Session port (driven adapter: domain ↔ broker)
// ───────────────────────────────────────────────────────────────

/// Largest inbound payload the firmware accepts (bytes).
pub const MAX_INBOUND_LEN: usize = 1024;

/// Inbound messages buffered between two `maintain()` calls.
pub const INBOX_DEPTH: usize = 16;

/// One inbound publish received on a subscribed topic.
///
/// The payload is the raw byte sequence exactly as delivered; it is never
/// assumed to be text or null-terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: heapless::Vec<u8, MAX_INBOUND_LEN>,
}

impl InboundMessage {
    /// `None` when `payload` is longer than [`MAX_INBOUND_LEN`].
    pub fn new(topic: &str, payload: &[u8]) -> Option<Self> {
        Some(Self {
            topic: topic.to_owned(),
            payload: heapless::Vec::from_slice(payload).ok()?,
        })
    }
}

/// Bounded queue from the transport task to the main loop.
///
/// Firmware keeps it in a `static`; see [`leak_inbox`] for host code.
pub type Inbox = Channel<CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>;

/// Capability the session uses to hand inbound messages to the core.
///
/// Installed by the connection manager after every successful connect.
/// Transports drop it when the session goes away.  `try_send` fails
/// when the inbox is full; the message is then lost.
pub type InboundHandler = Sender<'static, CriticalSectionRawMutex, InboundMessage, INBOX_DEPTH>;

/// Allocate an inbox that lives for the rest of the process.
pub fn leak_inbox() -> &'static Inbox {
    Box::leak(Box::new(Inbox::new()))
}

/// Subscription delivery assurance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
}

/// Credentials presented on every connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectParams<'a> {
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Reasons a connect attempt can fail.
///
/// Mirrors the classic MQTT client state codes so operators can match the
/// numbers they see on the status display against broker logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// No CONNACK within the transport timeout.
    Timeout,
    /// The link dropped during the handshake.
    ConnectionLost,
    /// TCP/TLS could not be established (broker unreachable, bad certificate).
    Network,
    /// Broker refused the protocol version.
    BadProtocol,
    /// Broker refused the client identifier.
    ClientIdRejected,
    /// Broker is up but not accepting sessions.
    ServerUnavailable,
    /// Username or password malformed.
    BadCredentials,
    /// Broker refused the credentials. Terminal for this process.
    Unauthorized,
}

impl ConnectFailure {
    /// Numeric state code (negative = client side, positive = CONNACK code).
    pub const fn code(self) -> i8 {
        match self {
            Self::Timeout => -4,
            Self::ConnectionLost => -3,
            Self::Network => -2,
            Self::BadProtocol => 1,
            Self::ClientIdRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadCredentials => 4,
            Self::Unauthorized => 5,
        }
    }

    /// Map a CONNACK return code onto a failure.
    pub const fn from_connack(code: u8) -> Self {
        match code {
            1 => Self::BadProtocol,
            2 => Self::ClientIdRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadCredentials,
            5 => Self::Unauthorized,
            _ => Self::Network,
        }
    }

    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Timeout => "connection timeout",
            Self::ConnectionLost => "connection lost",
            Self::Network => "connect failed",
            Self::BadProtocol => "bad protocol",
            Self::ClientIdRejected => "client id rejected",
            Self::ServerUnavailable => "server unavailable",
            Self::BadCredentials => "bad credentials",
            Self::Unauthorized => "unauthorized",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

/// Errors from established-session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// No live session.
    NotConnected,
    /// The broker or client declined the operation.
    Rejected,
    /// Payload exceeds the transport buffer.
    PayloadTooLarge,
    /// Generic transport failure.
    Transport,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Rejected => write!(f, "rejected by broker"),
            Self::PayloadTooLarge => write!(f, "payload exceeds transport buffer"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

/// The single broker session handle.  Exclusively owned by
/// [`ConnectionManager`](super::connection::ConnectionManager).
pub trait SessionPort {
    /// Connect and authenticate.  Blocks until the broker answers or the
    /// transport times out.
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), ConnectFailure>;

    /// Whether the transport still considers the session live.
    fn is_connected(&self) -> bool;

    /// Install the inbound-message handler.  Some transports forget it
    /// across reconnects, so callers re-install it after every connect.
    fn set_handler(&mut self, handler: InboundHandler);

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;

    /// Run one transport loop step: process acknowledgements and deliver
    /// queued inbound messages to the installed handler.
    /// Returns `false` when the step failed.
    fn poll(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time, wall-clock time and blocking delays.
pub trait Clock {
    /// Milliseconds since boot (monotonic).
    fn now_ms(&self) -> u64;

    /// Seconds since the Unix epoch (0 until the wall clock is synced).
    fn unix_time(&self) -> i64;

    /// Block the calling task.  The only suspension point of the core.
    fn sleep_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Errors from sensor reads and initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Device did not answer or reported an unexpected id.
    NotDetected,
    /// I²C transaction failed.
    Bus,
    /// Measurement did not complete in time.
    Timeout,
    /// Checksum mismatch on the returned frame.
    Crc,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetected => write!(f, "sensor not detected"),
            Self::Bus => write!(f, "I2C bus error"),
            Self::Timeout => write!(f, "measurement timeout"),
            Self::Crc => write!(f, "checksum mismatch"),
        }
    }
}

/// Read-side port: the scheduler calls this to obtain sensor data.
pub trait SensorPort {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError>;

    fn read_pulse(&mut self) -> Result<PulseReading, SensorError>;

    fn read_motion(&mut self) -> Result<MotionReading, SensorError>;

    /// Fast continuous-update step for the pulse oximeter.  Must run every
    /// loop tick for beat detection to work.
    fn update_pulse(&mut self, now_ms: u64);
}

// ───────────────────────────────────────────────────────────────
// Firmware update port
// ───────────────────────────────────────────────────────────────

/// External collaborator that performs over-the-air updates.
pub trait FirmwareUpdatePort {
    /// Handle an update trigger; `payload` is the full message text.
    fn on_update_request(&mut self, payload: &str);
}

// ───────────────────────────────────────────────────────────────
// Power port
// ───────────────────────────────────────────────────────────────

pub trait PowerPort {
    /// Irreversible low-power halt.  On hardware this never returns; only
    /// an external reset brings the device back.
    fn halt(&mut self);

    /// Software reset (used after fatal initialization errors and OTA).
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / status)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (firmware version record, OTA bookkeeping).
///
/// Write operations MUST be atomic, with no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

//! Outbound application events.
//!
//! The core emits these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them (log to
//! serial or drive a status display).

use super::ports::ConnectFailure;
use super::publisher::PublishError;
use super::router::TopicRoute;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Session established (carries the lifetime attempt counter).
    Connected { attempts: u32 },

    /// A non-fatal connect attempt failed; a retry follows.
    ConnectFailed { failure: ConnectFailure },

    /// The broker refused our credentials; network activity has stopped.
    FatalUnauthorized,

    /// An established session dropped.
    ConnectionLost,

    /// An inbound message was routed.
    MessageRouted { topic: String, route: TopicRoute },

    /// A telemetry envelope was accepted by the session.
    TelemetryPublished { bytes: usize },

    /// A telemetry envelope was not sent.
    PublishFailed(PublishError),

    /// Periodic healthcheck, with the current operator status text.
    Health { connected: bool, status: String },
}

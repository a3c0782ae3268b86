//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A status display adapter would implement the same trait.

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::app::router::TopicRoute;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Connected { attempts } => {
                info!("SESSION | connected | attempts={}", attempts);
            }
            AppEvent::ConnectFailed { failure } => {
                warn!("SESSION | connect failed | state={}", failure.code());
            }
            AppEvent::FatalUnauthorized => {
                error!("SESSION | unauthorized | halted");
            }
            AppEvent::ConnectionLost => {
                warn!("SESSION | lost");
            }
            AppEvent::MessageRouted { topic, route } => match route {
                TopicRoute::FirmwareUpdate => info!("CMD | firmware update requested | topic={}", topic),
                TopicRoute::Alert => info!("CMD | alert raised | topic={}", topic),
                TopicRoute::Ignored => info!("CMD | ignored | topic={}", topic),
            },
            AppEvent::TelemetryPublished { bytes } => {
                info!("TELEM | published | bytes={}", bytes);
            }
            AppEvent::PublishFailed(e) => {
                warn!("TELEM | dropped | {}", e);
            }
            AppEvent::Health { connected, status } => {
                info!(
                    "HEALTH | mqtt={} | status={}",
                    if *connected { "UP" } else { "DOWN" },
                    status
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{ConnectFailure, SessionError};
    use crate::app::publisher::PublishError;

    #[test]
    fn every_event_renders_without_a_logger() {
        let mut sink = LogEventSink::new();
        let events = [
            AppEvent::Connected { attempts: 3 },
            AppEvent::ConnectFailed { failure: ConnectFailure::Network },
            AppEvent::FatalUnauthorized,
            AppEvent::ConnectionLost,
            AppEvent::MessageRouted { topic: "vitalnode/in".into(), route: TopicRoute::Alert },
            AppEvent::TelemetryPublished { bytes: 212 },
            AppEvent::PublishFailed(PublishError::Transport(SessionError::NotConnected)),
            AppEvent::PublishFailed(PublishError::TooLarge { len: 600, max: 512 }),
            AppEvent::Health { connected: false, status: "OK".into() },
        ];
        for event in &events {
            sink.emit(event);
        }
    }
}

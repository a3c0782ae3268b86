//! Inbound command routing.
//!
//! Classifies each message received on a subscribed topic and hands it to
//! the firmware-update collaborator or to the alert state.  First match wins:
//!
//! 1. topic == firmware-update topic → [`FirmwareUpdatePort`]
//! 2. payload contains the alert marker → [`AlertState::raise`]
//! 3. anything else is logged and dropped

use log::{info, warn};

use super::alert::AlertState;
use super::ports::FirmwareUpdatePort;

/// Where an inbound message ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRoute {
    FirmwareUpdate,
    Alert,
    Ignored,
}

/// Fixed routing table, configured at startup.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    firmware_update_topic: String,
    alert_marker: String,
}

impl MessageRouter {
    pub fn new(firmware_update_topic: &str, alert_marker: &str) -> Self {
        Self {
            firmware_update_topic: firmware_update_topic.to_owned(),
            alert_marker: alert_marker.to_owned(),
        }
    }

    /// Classify without side effects.
    pub fn classify(&self, topic: &str, payload: &str) -> TopicRoute {
        if topic == self.firmware_update_topic {
            TopicRoute::FirmwareUpdate
        } else if payload.contains(self.alert_marker.as_str()) {
            TopicRoute::Alert
        } else {
            TopicRoute::Ignored
        }
    }

    /// Dispatch one inbound message.  `payload` is exactly the bytes the
    /// transport delivered; invalid UTF-8 is replaced, never truncated.
    pub fn dispatch(
        &self,
        topic: &str,
        payload: &[u8],
        alerts: &mut AlertState,
        firmware: &mut impl FirmwareUpdatePort,
        now_ms: u64,
    ) -> TopicRoute {
        let text = String::from_utf8_lossy(payload);
        info!("Router: [{}] ({} bytes) {}", topic, payload.len(), text);

        let route = self.classify(topic, &text);
        match route {
            TopicRoute::FirmwareUpdate => {
                info!("Router: firmware-update request, forwarding");
                firmware.on_update_request(&text);
            }
            TopicRoute::Alert => alerts.raise(&text, now_ms),
            TopicRoute::Ignored => {
                warn!("Router: message on '{}' is neither OTA nor alert, ignored", topic);
            }
        }
        route
    }
}

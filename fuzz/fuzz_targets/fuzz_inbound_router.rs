//! Fuzz target: `MessageRouter::dispatch`
//!
//! Splits the input into a topic and a payload and routes it.  The router
//! must never panic on non-UTF-8 payloads, must forward update-topic
//! payloads without losing bytes, and must only raise alerts off that topic.
//!
//! cargo fuzz run fuzz_inbound_router

#![no_main]

use libfuzzer_sys::fuzz_target;
use vitalnode::app::alert::AlertState;
use vitalnode::app::ports::FirmwareUpdatePort;
use vitalnode::app::router::{MessageRouter, TopicRoute};

const UPDATE_TOPIC: &str = "vitalnode/ota";

#[derive(Default)]
struct Sink {
    last: Option<String>,
}

impl FirmwareUpdatePort for Sink {
    fn on_update_request(&mut self, payload: &str) {
        self.last = Some(payload.to_owned());
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let topic = if selector & 1 == 0 { UPDATE_TOPIC } else { "vitalnode/in" };

    let router = MessageRouter::new(UPDATE_TOPIC, "ALERT");
    let mut alerts = AlertState::new(60_000);
    let mut ota = Sink::default();
    let route = router.dispatch(topic, payload, &mut alerts, &mut ota, 0);

    match route {
        TopicRoute::FirmwareUpdate => {
            assert_eq!(topic, UPDATE_TOPIC);
            assert!(!alerts.is_active());
            let forwarded = ota.last.expect("update payload not forwarded");
            assert_eq!(forwarded, String::from_utf8_lossy(payload));
        }
        TopicRoute::Alert => {
            assert!(ota.last.is_none());
            assert!(alerts.query(1).contains("ALERT"));
        }
        TopicRoute::Ignored => {
            assert!(ota.last.is_none());
            assert!(!alerts.is_active());
        }
    }
});

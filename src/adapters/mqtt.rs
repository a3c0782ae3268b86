//! MQTT session adapter.
//!
//! Implements [`SessionPort`].
//!
//! - **`target_os = "espidf"`**: [`EspMqttSession`] wraps `EspMqttClient`
//!   over TLS (`mqtts://`), with the broker CA from configuration.  The
//!   client is event driven: the callback tracks link state and forwards
//!   complete publishes to the installed [`InboundHandler`].
//! - **`not(target_os = "espidf")`**: [`SimSession`] is an in-memory broker
//!   with scripted connect outcomes, injectable inbound messages and a
//!   publish log, used by the host tests.

use log::{debug, info, warn};

use crate::app::ports::{
    ConnectFailure, ConnectParams, InboundHandler, InboundMessage, QoS, SessionError, SessionPort,
};

// ═══════════════════════════════════════════════════════════════
//  ESP-IDF implementation
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "espidf")]
mod esp {
    use core::ffi::c_void;
    use core::sync::atomic::{AtomicU8, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use esp_idf_svc::handle::RawHandle;
    use esp_idf_svc::mqtt::client::{
        Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS as EspQoS,
    };
    use esp_idf_svc::sys;
    use esp_idf_svc::tls::X509;

    use super::*;
    use crate::drivers::watchdog::{self, Watchdog};

    /// Half the watchdog period, so a silent broker times out long before
    /// the TWDT would fire.
    const CONNECT_TIMEOUT: Duration = Duration::from_millis(watchdog::TIMEOUT_MS as u64 / 2);
    const CONNECT_POLL: Duration = Duration::from_millis(100);

    /// CONNACK return code of the last refused handshake (0 = none).
    static REFUSED_CODE: AtomicU8 = AtomicU8::new(0);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Link {
        Pending,
        Up,
        Down,
    }

    struct Shared {
        link: Link,
        handler: Option<InboundHandler>,
        dropped: u32,
    }

    pub struct EspMqttSession {
        url: String,
        server_cert: X509<'static>,
        buffer_len: usize,
        client: Option<EspMqttClient<'static>>,
        shared: Arc<Mutex<Shared>>,
        watchdog: Option<Watchdog>,
    }

    /// Raw `MQTT_EVENT_ERROR` hook.  The wrapped event payload does not
    /// carry the CONNACK return code, the raw event does.
    unsafe extern "C" fn record_refusal(
        _arg: *mut c_void,
        _base: sys::esp_event_base_t,
        _id: i32,
        data: *mut c_void,
    ) {
        if data.is_null() {
            return;
        }
        // SAFETY: ESP-MQTT hands every registered handler an esp_mqtt_event_t,
        // valid for the duration of the call.
        let event = unsafe { &*(data as *const sys::esp_mqtt_event_t) };
        if event.error_handle.is_null() {
            return;
        }
        // SAFETY: non-null error_handle points into the same event.
        let codes = unsafe { &*event.error_handle };
        if codes.error_type == sys::esp_mqtt_error_type_t_MQTT_ERROR_TYPE_CONNECTION_REFUSED {
            REFUSED_CODE.store(codes.connect_return_code as u8, Ordering::Release);
        }
    }

    impl EspMqttSession {
        /// `root_ca` is the broker CA in PEM form; it is kept for the
        /// lifetime of the firmware.
        pub fn new(host: &str, port: u16, root_ca: &str, buffer_len: usize) -> Self {
            let mut pem = root_ca.as_bytes().to_vec();
            pem.push(0);
            let pem: &'static [u8] = Box::leak(pem.into_boxed_slice());
            Self {
                url: format!("mqtts://{}:{}", host, port),
                server_cert: X509::pem_until_nul(pem),
                buffer_len,
                client: None,
                shared: Arc::new(Mutex::new(Shared {
                    link: Link::Down,
                    handler: None,
                    dropped: 0,
                })),
                watchdog: None,
            }
        }

        /// Feed `watchdog` while a connect attempt is waiting on the broker.
        pub fn with_watchdog(mut self, watchdog: Watchdog) -> Self {
            self.watchdog = Some(watchdog);
            self
        }

        /// Inbound messages lost to a full inbox or an oversized payload.
        pub fn dropped(&self) -> u32 {
            self.shared.lock().map_or(0, |s| s.dropped)
        }

        fn link(&self) -> Link {
            self.shared.lock().map_or(Link::Down, |s| s.link)
        }

        fn set_link(shared: &Mutex<Shared>, link: Link) {
            if let Ok(mut s) = shared.lock() {
                s.link = link;
                if link != Link::Up {
                    s.handler = None;
                }
            }
        }

        fn count_drop(shared: &Mutex<Shared>) {
            if let Ok(mut s) = shared.lock() {
                s.dropped = s.dropped.wrapping_add(1);
            }
        }

        fn deliver(shared: &Mutex<Shared>, topic: &str, data: &[u8]) {
            let Some(msg) = InboundMessage::new(topic, data) else {
                warn!("MQTT: dropped {} byte message on '{}' (too large)", data.len(), topic);
                Self::count_drop(shared);
                return;
            };
            let handler = shared.lock().ok().and_then(|s| s.handler.clone());
            match handler {
                Some(tx) => {
                    if tx.try_send(msg).is_err() {
                        warn!("MQTT: inbox full, dropped message on '{}'", topic);
                        Self::count_drop(shared);
                    }
                }
                None => debug!("MQTT: no handler, dropped message on '{}'", topic),
            }
        }

        /// Failure for a handshake that ended with the link down.
        fn refusal() -> ConnectFailure {
            match REFUSED_CODE.swap(0, Ordering::AcqRel) {
                0 => ConnectFailure::Network,
                code => ConnectFailure::from_connack(code),
            }
        }

        fn feed(&self) {
            if let Some(wd) = &self.watchdog {
                wd.feed();
            }
        }
    }

    impl SessionPort for EspMqttSession {
        fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), ConnectFailure> {
            // A fresh client per attempt; dropping the old one closes it.
            self.client = None;
            REFUSED_CODE.store(0, Ordering::Release);
            Self::set_link(&self.shared, Link::Pending);

            let conf = MqttClientConfiguration {
                client_id: Some(params.client_id),
                username: (!params.username.is_empty()).then_some(params.username),
                password: (!params.password.is_empty()).then_some(params.password),
                server_certificate: Some(self.server_cert),
                buffer_size: self.buffer_len,
                out_buffer_size: self.buffer_len,
                ..Default::default()
            };

            let shared = Arc::clone(&self.shared);
            let buffer_len = self.buffer_len;
            let client = EspMqttClient::new_cb(&self.url, &conf, move |event| {
                match event.payload() {
                    EventPayload::Connected(_) => Self::set_link(&shared, Link::Up),
                    // ESP-MQTT follows every error with a disconnect, and
                    // record_refusal has run by then.
                    EventPayload::Disconnected => Self::set_link(&shared, Link::Down),
                    EventPayload::Error(e) => warn!("MQTT: transport error {:?}", e),
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details: Details::Complete,
                        ..
                    } => Self::deliver(&shared, topic, data),
                    EventPayload::Received {
                        topic,
                        details: Details::InitialChunk(_),
                        ..
                    } => {
                        warn!(
                            "MQTT: dropped oversized message on '{}' (exceeds {} byte buffer)",
                            topic.unwrap_or("?"),
                            buffer_len
                        );
                        Self::count_drop(&shared);
                    }
                    _ => {}
                }
            })
            .map_err(|e| {
                warn!("MQTT: client init failed: {:?}", e);
                ConnectFailure::Network
            })?;

            // SAFETY: the handle belongs to `client`, which outlives the
            // registration; a null argument is never dereferenced.
            let ret = unsafe {
                sys::esp_mqtt_client_register_event(
                    client.handle(),
                    sys::esp_mqtt_event_id_t_MQTT_EVENT_ERROR,
                    Some(record_refusal),
                    core::ptr::null_mut(),
                )
            };
            if ret != sys::ESP_OK {
                warn!("MQTT: error hook not registered ({}), refusals read as network errors", ret);
            }
            self.client = Some(client);

            let started = Instant::now();
            loop {
                self.feed();
                match self.link() {
                    Link::Up => {
                        info!("MQTT: TLS session up ({})", self.url);
                        return Ok(());
                    }
                    Link::Down => {
                        self.client = None;
                        return Err(Self::refusal());
                    }
                    Link::Pending if started.elapsed() >= CONNECT_TIMEOUT => {
                        self.client = None;
                        Self::set_link(&self.shared, Link::Down);
                        return Err(ConnectFailure::Timeout);
                    }
                    Link::Pending => std::thread::sleep(CONNECT_POLL),
                }
            }
        }

        fn is_connected(&self) -> bool {
            self.client.is_some() && self.link() == Link::Up
        }

        fn set_handler(&mut self, handler: InboundHandler) {
            if let Ok(mut s) = self.shared.lock() {
                s.handler = Some(handler);
            }
        }

        fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
            let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
            let qos = match qos {
                QoS::AtMostOnce => EspQoS::AtMostOnce,
                QoS::AtLeastOnce => EspQoS::AtLeastOnce,
            };
            client
                .subscribe(topic, qos)
                .map(|_| ())
                .map_err(|_| SessionError::Rejected)
        }

        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
            if payload.len() > self.buffer_len {
                return Err(SessionError::PayloadTooLarge);
            }
            let client = self.client.as_mut().ok_or(SessionError::NotConnected)?;
            client
                .publish(topic, EspQoS::AtMostOnce, false, payload)
                .map(|_| ())
                .map_err(|_| SessionError::Transport)
        }

        fn poll(&mut self) -> bool {
            // Events arrive on the client task; nothing to pump here.
            self.is_connected()
        }
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspMqttSession;

// ═══════════════════════════════════════════════════════════════
//  Host simulation
// ═══════════════════════════════════════════════════════════════

/// In-memory session for host builds.
///
/// Delivery follows the device: a message that does not fit the inbox, or
/// arrives with no handler installed, is dropped and counted.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct SimSession {
    /// Outcomes for upcoming connect attempts; empty means success.
    connect_script: std::collections::VecDeque<Result<(), ConnectFailure>>,
    /// Inbound messages delivered on the next `poll()`.
    pending: std::collections::VecDeque<InboundMessage>,
    connected: bool,
    fail_next_poll: bool,
    reject_publishes: bool,
    handler: Option<InboundHandler>,

    pub connect_attempts: u32,
    pub handler_installs: u32,
    pub subscriptions: Vec<(String, QoS)>,
    pub published: Vec<(String, Vec<u8>)>,
    /// Inbound messages lost (inbox full, no handler, or too large).
    pub dropped: u32,
}

#[cfg(not(target_os = "espidf"))]
impl SimSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue connect outcomes, consumed one per attempt.
    pub fn script_connects(&mut self, outcomes: &[Result<(), ConnectFailure>]) {
        self.connect_script.extend(outcomes.iter().copied());
    }

    /// Queue a publish from the broker; delivered on the next `poll()`.
    pub fn inject(&mut self, topic: &str, payload: &[u8]) {
        match InboundMessage::new(topic, payload) {
            Some(msg) => self.pending.push_back(msg),
            None => {
                warn!("SimSession: dropped {} byte message on '{}' (too large)", payload.len(), topic);
                self.dropped += 1;
            }
        }
    }

    /// Simulate the broker dropping the link.  The handler goes with it.
    pub fn drop_link(&mut self) {
        info!("SimSession: link dropped");
        self.connected = false;
        self.handler = None;
    }

    pub fn fail_next_poll(&mut self) {
        self.fail_next_poll = true;
    }

    pub fn set_reject_publishes(&mut self, reject: bool) {
        self.reject_publishes = reject;
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

#[cfg(not(target_os = "espidf"))]
impl SessionPort for SimSession {
    fn connect(&mut self, params: &ConnectParams<'_>) -> Result<(), ConnectFailure> {
        self.connect_attempts += 1;
        let outcome = self.connect_script.pop_front().unwrap_or(Ok(()));
        debug!(
            "SimSession: connect #{} as '{}' -> {:?}",
            self.connect_attempts, params.client_id, outcome
        );
        self.connected = outcome.is_ok();
        // A fresh session never remembers the previous handler.
        self.handler = None;
        outcome
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_handler(&mut self, handler: InboundHandler) {
        self.handler_installs += 1;
        self.handler = Some(handler);
    }

    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.subscriptions.push((topic.to_owned(), qos));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        if self.reject_publishes {
            return Err(SessionError::Rejected);
        }
        self.published.push((topic.to_owned(), payload.to_vec()));
        // The broker echoes publishes on subscribed topics back to us.
        if self.subscriptions.iter().any(|(t, _)| t == topic) {
            self.inject(topic, payload);
        }
        Ok(())
    }

    fn poll(&mut self) -> bool {
        if std::mem::take(&mut self.fail_next_poll) {
            return false;
        }
        if !self.connected {
            return false;
        }
        while let Some(msg) = self.pending.pop_front() {
            let Some(tx) = &self.handler else {
                warn!("SimSession: no handler, dropped message on '{}'", msg.topic);
                self.dropped += 1;
                continue;
            };
            let topic = msg.topic.clone();
            if tx.try_send(msg).is_err() {
                warn!("SimSession: inbox full, dropped message on '{}'", topic);
                self.dropped += 1;
            }
        }
        true
    }
}

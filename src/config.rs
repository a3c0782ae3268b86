//! Device configuration parameters
//!
//! Broker credentials, topics and timing for the VitalNode firmware.
//! Defaults are development values; production images override them at
//! build time through environment variables (see [`DeviceConfig::from_build_env`]).

use serde::{Deserialize, Serialize};

use crate::app::ports::MAX_INBOUND_LEN;

/// Minimum pause between two broker connection attempts (milliseconds).
pub const MIN_RETRY_DELAY_MS: u32 = 5_000;

/// Smallest envelope limit that can still hold every telemetry field.
const MIN_ENVELOPE_LEN: usize = 64;

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Broker ---
    /// Broker hostname (also used for TLS SNI)
    pub broker_host: String,
    /// Broker port (8883 for MQTT over TLS)
    pub broker_port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    /// PEM-encoded root CA used to verify the broker
    pub root_ca: String,

    // --- Topics ---
    /// Command channel, subscribed at-least-once
    pub subscribe_topic: String,
    /// Telemetry channel
    pub publish_topic: String,
    /// Firmware-update trigger topic (may equal `subscribe_topic`)
    pub firmware_update_topic: String,

    // --- Identity ---
    pub firmware_version: String,
    /// Prefix of the MAC-derived device id (`<PREFIX>-XXXXXXXXXXXX`)
    pub device_id_prefix: String,
    /// Substring that marks an inbound payload as an operator alert
    pub alert_marker: String,

    // --- Timing ---
    /// Full sensor sample interval (seconds)
    pub measure_interval_secs: u32,
    /// How long a raised alert stays visible (seconds)
    pub alert_duration_secs: u32,
    /// Pause between failed connection attempts (milliseconds)
    pub retry_delay_ms: u32,
    /// Drain passes run right after a successful (re)connect
    pub drain_passes: u8,
    /// Length of one post-connect drain pass (milliseconds)
    pub drain_pass_ms: u32,
    /// Session healthcheck log period (milliseconds)
    pub healthcheck_interval_ms: u32,
    /// Main loop period (milliseconds)
    pub loop_interval_ms: u32,

    // --- Buffers ---
    /// Largest inbound payload accepted by the session (bytes)
    pub inbound_buffer_len: usize,
    /// Largest telemetry envelope that may be published (bytes)
    pub max_envelope_len: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            broker_host: "broker.local".into(),
            broker_port: 8883,
            username: "device".into(),
            password: String::new(),
            client_id: "vitalnode".into(),
            root_ca: String::new(),

            subscribe_topic: "vitalnode/in".into(),
            publish_topic: "vitalnode/out".into(),
            firmware_update_topic: "vitalnode/ota".into(),

            firmware_version: env!("CARGO_PKG_VERSION").into(),
            device_id_prefix: "ESP32".into(),
            alert_marker: "ALERT".into(),

            measure_interval_secs: 2,
            alert_duration_secs: 60,
            retry_delay_ms: MIN_RETRY_DELAY_MS,
            drain_passes: 2,
            drain_pass_ms: 100,
            healthcheck_interval_ms: 30_000,
            loop_interval_ms: 10,

            inbound_buffer_len: 1024,
            max_envelope_len: 512,
        }
    }
}

/// Errors from [`DeviceConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl DeviceConfig {
    /// Defaults overridden by values baked in at compile time.
    ///
    /// Numeric variables that fail to parse keep their default.
    pub fn from_build_env() -> Self {
        let mut cfg = Self::default();
        set_text(&mut cfg.broker_host, option_env!("MQTT_SERVER"));
        set_text(&mut cfg.username, option_env!("MQTT_USER"));
        set_text(&mut cfg.password, option_env!("MQTT_PASSWORD"));
        set_text(&mut cfg.client_id, option_env!("MQTT_CLIENT_ID"));
        set_text(&mut cfg.root_ca, option_env!("ROOT_CA"));
        set_text(&mut cfg.subscribe_topic, option_env!("MQTT_TOPIC_SUB"));
        set_text(&mut cfg.publish_topic, option_env!("MQTT_TOPIC_PUB"));
        set_text(&mut cfg.firmware_update_topic, option_env!("OTA_TOPIC"));
        set_text(&mut cfg.firmware_version, option_env!("FIRMWARE_VERSION"));
        set_parsed(&mut cfg.broker_port, option_env!("MQTT_PORT"));
        set_parsed(&mut cfg.measure_interval_secs, option_env!("MEASURE_INTERVAL"));
        set_parsed(&mut cfg.alert_duration_secs, option_env!("ALERT_DURATION"));
        cfg
    }

    /// Reject configurations the connection and sampling logic cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.is_empty() {
            return Err(ConfigError::ValidationFailed("broker_host must not be empty"));
        }
        if self.broker_port == 0 {
            return Err(ConfigError::ValidationFailed("broker_port must be non-zero"));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::ValidationFailed("client_id must not be empty"));
        }
        if self.subscribe_topic.is_empty()
            || self.publish_topic.is_empty()
            || self.firmware_update_topic.is_empty()
        {
            return Err(ConfigError::ValidationFailed("topics must not be empty"));
        }
        if self.alert_marker.is_empty() {
            return Err(ConfigError::ValidationFailed("alert_marker must not be empty"));
        }
        if self.measure_interval_secs == 0 {
            return Err(ConfigError::ValidationFailed("measure_interval_secs must be > 0"));
        }
        if self.alert_duration_secs == 0 {
            return Err(ConfigError::ValidationFailed("alert_duration_secs must be > 0"));
        }
        if self.retry_delay_ms < MIN_RETRY_DELAY_MS {
            return Err(ConfigError::ValidationFailed("retry_delay_ms must be >= 5000"));
        }
        if self.max_envelope_len < MIN_ENVELOPE_LEN {
            return Err(ConfigError::ValidationFailed("max_envelope_len must be >= 64"));
        }
        if self.inbound_buffer_len == 0 {
            return Err(ConfigError::ValidationFailed("inbound_buffer_len must be > 0"));
        }
        if self.inbound_buffer_len > MAX_INBOUND_LEN {
            return Err(ConfigError::ValidationFailed("inbound_buffer_len must be <= 1024"));
        }
        Ok(())
    }

    pub fn measure_interval_ms(&self) -> u64 {
        u64::from(self.measure_interval_secs) * 1000
    }

    pub fn alert_ttl_ms(&self) -> u64 {
        u64::from(self.alert_duration_secs) * 1000
    }
}

fn set_text(field: &mut String, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *field = v.to_owned();
    }
}

fn set_parsed<T: core::str::FromStr>(field: &mut T, value: Option<&str>) {
    if let Some(v) = value.and_then(|v| v.trim().parse().ok()) {
        *field = v;
    }
}

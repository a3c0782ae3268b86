//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                 |
//! |----------------|--------------------|-----------------------------|
//! | `device_id`    |                    | eFuse base MAC              |
//! | `log_sink`     | EventSink          | Serial log output           |
//! | `mqtt`         | SessionPort        | ESP-MQTT over TLS / sim     |
//! | `nvs`          | StoragePort        | NVS / in-memory store       |
//! | `ota_updater`  | FirmwareUpdatePort | HTTPS download + OTA slots  |
//! | `power`        | PowerPort          | Deep sleep / esp_restart    |
//! | `time`         | Clock              | ESP32 system timer + SNTP   |

pub mod device_id;
pub mod log_sink;
pub mod mqtt;
pub mod nvs;
pub mod ota_updater;
pub mod power;
pub mod time;

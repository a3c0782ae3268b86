//! Device identity derived from the ESP32 factory MAC address.
//!
//! Produces a stable device ID in the form `<PREFIX>-XXXXXXXXXXXX`
//! (all 6 MAC bytes in uppercase hex, no separators).  This ID is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Reported as `device_id` in every telemetry envelope

use core::fmt::Write;

/// Fixed-size device ID string: prefix (≤ 19 chars) + "-" + 12 hex digits.
pub type DeviceIdString = heapless::String<32>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: `mac` is a valid 6-byte buffer, as the API requires.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the device ID from the full MAC.
/// Format: `<PREFIX>-XXXXXXXXXXXX` (e.g., `ESP32-DEADBEEFCAFE`).
///
/// Prefixes longer than 19 bytes are truncated so the id always fits.
pub fn device_id(prefix: &str, mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let cut = prefix
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= 19)
        .last()
        .unwrap_or(0);
    let _ = id.push_str(&prefix[..cut]);
    let _ = id.push('-');
    for byte in mac {
        let _ = write!(id, "{:02X}", byte);
    }
    id
}

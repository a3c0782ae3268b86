//! Power adapter: deep-sleep halt and software restart.
//!
//! [`PowerPort::halt`] enters deep sleep with no wake source configured, so
//! only an external reset brings the device back.  On the host both
//! operations are recorded instead.

use log::{error, warn};

use crate::app::ports::PowerPort;

#[derive(Debug, Default)]
pub struct SystemPower {
    #[cfg(not(target_os = "espidf"))]
    halts: u32,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl SystemPower {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn halts(&self) -> u32 {
        self.halts
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl PowerPort for SystemPower {
    #[cfg(target_os = "espidf")]
    fn halt(&mut self) {
        error!("Power: entering deep sleep until external reset");
        unsafe {
            esp_idf_svc::sys::esp_sleep_disable_wakeup_source(
                esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_ALL,
            );
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn halt(&mut self) {
        error!("Power(sim): deep sleep until external reset");
        self.halts += 1;
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        warn!("Power: restarting");
        unsafe { esp_idf_svc::sys::esp_restart() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        warn!("Power(sim): restart requested");
        self.restarts += 1;
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn simulation_records_calls() {
        let mut p = SystemPower::new();
        p.halt();
        p.restart();
        p.restart();
        assert_eq!((p.halts(), p.restarts()), (1, 2));
    }
}

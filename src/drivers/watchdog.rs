//! Task Watchdog Timer (TWDT) driver.
//!
//! Resets the device if the main task stops feeding for 10 seconds.
//! The main loop feeds once per iteration.  [`SystemClock`] feeds between
//! the sleep slices of the connection retry delay, the MQTT session while
//! it waits for the broker, and the OTA updater per download read.
//!
//! [`SystemClock`]: crate::adapters::time::SystemClock

use log::{error, info, warn};

use crate::error::Error;

pub const TIMEOUT_MS: u32 = 10_000;

/// The main task's TWDT subscription.  `Copy` so each blocking adapter
/// can hold its own handle.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    #[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
    armed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Arm the TWDT for the calling task.  A failed subscription is logged
    /// and leaves an inert handle.
    pub fn new() -> Self {
        let armed = subscribe_current_task();
        if armed {
            info!("Watchdog: armed, {} ms timeout", TIMEOUT_MS);
        } else {
            warn!("Watchdog: not armed, main task is unsupervised");
        }
        Self { armed }
    }

    /// Feed the watchdog.  Must run at least once per [`TIMEOUT_MS`].
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.armed {
            // SAFETY: the calling task was subscribed in `new`.
            unsafe {
                esp_idf_svc::sys::esp_task_wdt_reset();
            }
        }
    }

    /// Run one blocking call that cannot feed (flash erase) with the
    /// calling task unsubscribed, then subscribe again.
    pub fn unsupervised<T>(&self, f: impl FnOnce() -> T) -> T {
        #[cfg(target_os = "espidf")]
        if self.armed {
            // SAFETY: the calling task was subscribed in `new`.
            unsafe {
                esp_idf_svc::sys::esp_task_wdt_delete(core::ptr::null_mut());
            }
            let out = f();
            if !subscribe_current_task() {
                warn!("Watchdog: re-subscribe failed, main task is unsupervised");
            }
            return out;
        }
        f()
    }
}

#[cfg(target_os = "espidf")]
fn subscribe_current_task() -> bool {
    use esp_idf_svc::sys::{
        ESP_OK, esp_task_wdt_add, esp_task_wdt_config_t, esp_task_wdt_reconfigure,
    };

    let cfg = esp_task_wdt_config_t {
        timeout_ms: TIMEOUT_MS,
        idle_core_mask: 0,
        trigger_panic: true,
    };
    // SAFETY: plain FFI calls; a null task handle means "current task".
    unsafe {
        let ret = esp_task_wdt_reconfigure(&cfg);
        if ret != ESP_OK {
            warn!("Watchdog: reconfigure returned {}, keeping boot settings", ret);
        }
        let ret = esp_task_wdt_add(core::ptr::null_mut());
        if ret != ESP_OK {
            warn!("Watchdog: subscribe failed ({})", ret);
        }
        ret == ESP_OK
    }
}

#[cfg(not(target_os = "espidf"))]
fn subscribe_current_task() -> bool {
    true
}

/// Unrecoverable initialization failure: log and reset the chip.
#[cfg(target_os = "espidf")]
pub fn fatal_restart(err: &Error) -> ! {
    error!("FATAL: {}, restarting in 1 s", err);
    std::thread::sleep(std::time::Duration::from_millis(1_000));
    // SAFETY: esp_restart has no preconditions.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
pub fn fatal_restart(err: &Error) -> ! {
    error!("FATAL: {}", err);
    panic!("fatal restart requested: {err}");
}

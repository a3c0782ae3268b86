//! ESP32 time adapter.
//!
//! Implements [`Clock`] for the firmware.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation.
//!
//! Wall-clock time comes from the C library clock, which SNTP sets on the
//! device.  [`wait_for_wall_clock`] blocks startup until it is plausible.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::app::ports::Clock;
use crate::drivers::watchdog::Watchdog;
use crate::error::{Error, Result};

/// Any Unix time at or below this is an unsynchronised clock (Nov 2023).
pub const MIN_VALID_UNIX_TIME: i64 = 1_700_000_000;

/// Poll period while waiting for SNTP.
pub const WALL_CLOCK_POLL_MS: u32 = 500;

/// Longest single sleep between watchdog feeds.
const FEED_SLICE_MS: u32 = 1_000;

/// System clock for the ESP32 platform.
pub struct SystemClock {
    watchdog: Option<Watchdog>,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            watchdog: None,
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Feed `watchdog` during long sleeps (e.g. the connect retry delay).
    pub fn with_watchdog(mut self, watchdog: Watchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    fn feed(&self) {
        if let Some(wd) = &self.watchdog {
            wd.feed();
        }
    }
}

impl Clock for SystemClock {
    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }

    fn sleep_ms(&mut self, ms: u32) {
        let mut remaining = ms;
        while remaining > 0 {
            let slice = remaining.min(FEED_SLICE_MS);
            self.feed();
            std::thread::sleep(Duration::from_millis(u64::from(slice)));
            remaining -= slice;
        }
        self.feed();
    }
}

/// Block until the wall clock is past [`MIN_VALID_UNIX_TIME`], polling every
/// [`WALL_CLOCK_POLL_MS`].  Gives up after `max_polls` polls.
pub fn wait_for_wall_clock(clock: &mut impl Clock, max_polls: u32) -> Result<i64> {
    info!("Time: waiting for SNTP sync");
    for poll in 0..max_polls {
        let now = clock.unix_time();
        if now > MIN_VALID_UNIX_TIME {
            info!("Time: synchronised after {} polls, unix={}", poll, now);
            return Ok(now);
        }
        clock.sleep_ms(WALL_CLOCK_POLL_MS);
    }
    warn!("Time: wall clock still unset after {} polls", max_polls);
    Err(Error::Init("wall clock not synchronised"))
}

//! Operator-visible alert with time-to-live.
//!
//! At most one alert is live.  Raising a new one replaces message and
//! raise time unconditionally.  Expiry is lazy: it happens inside
//! [`AlertState::query`].

use log::info;

/// Text reported when no alert is live.
pub const NO_ALERT: &str = "OK";

#[derive(Debug, Clone)]
pub struct AlertState {
    message: String,
    raised_at: u64,
    cleared_at: Option<u64>,
    ttl_ms: u64,
}

impl AlertState {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            message: String::new(),
            raised_at: 0,
            cleared_at: None,
            ttl_ms,
        }
    }

    /// Replace whatever alert is live with `message`, raised at `now_ms`.
    pub fn raise(&mut self, message: &str, now_ms: u64) {
        message.clone_into(&mut self.message);
        self.raised_at = now_ms;
        self.cleared_at = None;
        info!("Alert: raised '{}'", self.message);
    }

    /// Current alert text, or [`NO_ALERT`].
    ///
    /// Clears the alert once `now_ms - raised_at >= ttl`.
    pub fn query(&mut self, now_ms: u64) -> &str {
        if self.message.is_empty() {
            return NO_ALERT;
        }
        if now_ms.saturating_sub(self.raised_at) >= self.ttl_ms {
            info!("Alert: '{}' expired", self.message);
            self.message.clear();
            self.cleared_at = Some(now_ms);
            return NO_ALERT;
        }
        &self.message
    }

    pub fn is_active(&self) -> bool {
        !self.message.is_empty()
    }

    pub fn raised_at(&self) -> Option<u64> {
        self.is_active().then_some(self.raised_at)
    }

    /// When the last alert expired, if it did.
    pub fn cleared_at(&self) -> Option<u64> {
        self.cleared_at
    }
}

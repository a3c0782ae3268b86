//! Telemetry publishing.
//!
//! Encodes a [`SensorSample`] into the JSON envelope and hands it to the
//! session.  Oversized envelopes fail closed: nothing is sent.  Transport
//! rejections are logged and dropped; the next interval produces a fresh
//! sample, so stale data is never retried.

use core::fmt;

use log::{debug, info, warn};

use super::ports::{SessionError, SessionPort};
use super::telemetry::{SensorSample, TelemetryEnvelope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Encoded envelope exceeds the configured maximum.
    TooLarge { len: usize, max: usize },
    /// Serialisation failed.
    Encode,
    /// The session refused or failed the publish.
    Transport(SessionError),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { len, max } => {
                write!(f, "envelope too large ({} > {} bytes)", len, max)
            }
            Self::Encode => write!(f, "envelope encoding failed"),
            Self::Transport(e) => write!(f, "transport: {}", e),
        }
    }
}

pub struct TelemetryPublisher {
    topic: String,
    max_len: usize,
}

impl TelemetryPublisher {
    pub fn new(topic: &str, max_len: usize) -> Self {
        Self {
            topic: topic.to_owned(),
            max_len,
        }
    }

    /// Encode the envelope, enforcing the size limit.
    pub fn encode(&self, sample: &SensorSample) -> Result<Vec<u8>, PublishError> {
        let bytes = serde_json::to_vec(&TelemetryEnvelope::from(sample))
            .map_err(|_| PublishError::Encode)?;
        if bytes.len() > self.max_len {
            return Err(PublishError::TooLarge {
                len: bytes.len(),
                max: self.max_len,
            });
        }
        Ok(bytes)
    }

    /// Publish one sample.  Returns the envelope length on success.
    ///
    /// Every failure is logged here; callers may ignore the result.
    pub fn publish(
        &self,
        sample: &SensorSample,
        session: &mut impl SessionPort,
    ) -> Result<usize, PublishError> {
        let bytes = match self.encode(sample) {
            Ok(b) => b,
            Err(e) => {
                warn!("Publish: skipped, {}", e);
                return Err(e);
            }
        };
        debug!("Publish: {}", String::from_utf8_lossy(&bytes));

        match session.publish(&self.topic, &bytes) {
            Ok(()) => {
                info!("Publish: {} bytes to '{}'", bytes.len(), self.topic);
                Ok(bytes.len())
            }
            Err(e) => {
                warn!("Publish: broker declined ({}), sample dropped", e);
                Err(PublishError::Transport(e))
            }
        }
    }
}

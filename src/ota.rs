//! Over-the-air firmware update, backed by the `esp-ota` crate.
//!
//! Flow: firmware-update message → [`OtaRequest::parse`] → `OtaManager`
//! begin → N × sequential chunks → finalize → reboot.
//!
//! The image itself is fetched by the `ota_updater` adapter; this module
//! only tracks the partition write and validates requests.  On host builds
//! the partition calls are skipped and only the state machine runs.

use core::fmt;

use log::{info, warn};
use serde::Deserialize;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB
const IMAGE_CHUNK_SIZE: usize = 4096;
const MAX_VERSION_LEN: usize = 32;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    EmptyRequest,
    MalformedRequest,
    InvalidVersion,
    AlreadyInProgress,
    InvalidSize,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    NonSequential,
    Overflow,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty update request"),
            Self::MalformedRequest => write!(f, "malformed update request"),
            Self::InvalidVersion => write!(f, "version missing or too long"),
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::InvalidSize => write!(f, "firmware size out of range (max 4 MB)"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "finalize called before all bytes written"),
            Self::NotReceiving => write!(f, "operation requires active Receiving state"),
            Self::NonSequential => write!(f, "chunk offset does not match expected offset"),
            Self::Overflow => write!(f, "chunk would exceed declared firmware size"),
        }
    }
}

// ── Request parsing ───────────────────────────────────────────

/// A parsed firmware-update command.
///
/// Accepted payloads:
///
/// ```text
/// {"version": "1.2.0", "url": "https://fw.example/vitalnode-1.2.0.bin"}
/// 1.2.0
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OtaRequest {
    pub version: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl OtaRequest {
    pub fn parse(payload: &str) -> Result<Self, OtaError> {
        let text = payload.trim();
        if text.is_empty() {
            return Err(OtaError::EmptyRequest);
        }

        let req = if text.starts_with('{') {
            serde_json::from_str::<OtaRequest>(text).map_err(|_| OtaError::MalformedRequest)?
        } else {
            Self {
                version: text.to_owned(),
                url: None,
            }
        };

        if req.version.is_empty()
            || req.version.len() > MAX_VERSION_LEN
            || req.version.chars().any(char::is_whitespace)
        {
            return Err(OtaError::InvalidVersion);
        }
        Ok(req)
    }

    /// False when the request names the firmware already running.
    pub fn is_update_from(&self, running_version: &str) -> bool {
        self.version != running_version
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving {
        expected_size: u32,
        bytes_written: u32,
    },
    Verifying,
    ReadyToReboot,
    Failed,
}

// ── Manager (ESP-IDF: uses esp-ota crate) ─────────────────────

/// Partition writer for one image at a time.
pub struct OtaManager {
    state: OtaState,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaManager {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Begin an OTA session. Validates size and opens the inactive partition.
    pub fn begin(&mut self, firmware_size: u32) -> Result<(), OtaError> {
        if matches!(
            self.state,
            OtaState::Receiving { .. } | OtaState::Verifying
        ) {
            return Err(OtaError::AlreadyInProgress);
        }
        if firmware_size == 0 || firmware_size > MAX_FIRMWARE_SIZE {
            return Err(OtaError::InvalidSize);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.state = OtaState::Receiving {
            expected_size: firmware_size,
            bytes_written: 0,
        };
        info!("OTA: begin ({} bytes)", firmware_size);
        Ok(())
    }

    /// Write a chunk at the given byte offset. Returns total bytes written.
    pub fn write_chunk(&mut self, offset: u32, data: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };

        if offset != bytes_written {
            return Err(OtaError::NonSequential);
        }
        let new_written = u32::try_from(data.len())
            .ok()
            .and_then(|len| bytes_written.checked_add(len))
            .filter(|&n| n <= expected_size)
            .ok_or(OtaError::Overflow)?;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        Ok(new_written)
    }

    /// Stream the image that [`begin`](Self::begin) opened: `read` fills
    /// the buffer and returns 0 at end of image.  Any error, including a
    /// short image, aborts the session so the next request starts clean.
    pub fn receive_image(
        &mut self,
        mut read: impl FnMut(&mut [u8]) -> Result<usize, OtaError>,
    ) -> Result<(), OtaError> {
        let result = self
            .write_all_chunks(&mut read)
            .and_then(|()| self.finalize());
        if let Err(e) = result {
            warn!("OTA: image rejected ({})", e);
            self.abort();
        }
        result
    }

    fn write_all_chunks(
        &mut self,
        read: &mut impl FnMut(&mut [u8]) -> Result<usize, OtaError>,
    ) -> Result<(), OtaError> {
        let mut buf = [0u8; IMAGE_CHUNK_SIZE];
        let mut written = 0u32;
        let mut last_pct = 0u8;
        loop {
            let n = read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            let chunk = buf.get(..n).ok_or(OtaError::Overflow)?;
            written = self.write_chunk(written, chunk)?;
            let pct = self.progress_percent();
            if pct >= last_pct.saturating_add(10) {
                info!("OTA: {}%", pct);
                last_pct = pct;
            }
        }
    }

    /// Percentage of the declared image written so far.
    pub fn progress_percent(&self) -> u8 {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if expected_size > 0 => (u64::from(bytes_written) * 100 / u64::from(expected_size)) as u8,
            OtaState::Verifying | OtaState::ReadyToReboot => 100,
            _ => 0,
        }
    }

    /// Finalize: verify image, mark partition bootable, set ReadyToReboot.
    pub fn finalize(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(OtaError::IncompleteTransfer),
            _ => return Err(OtaError::NotReceiving),
        }

        self.state = OtaState::Verifying;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized, ready to reboot");
        Ok(())
    }

    /// Abort the current OTA session; resets to Idle.
    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.ota_update.take();
        }
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }
}

impl Default for OtaManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────

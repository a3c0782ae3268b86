//! Firmware-update adapter.
//!
//! Implements [`FirmwareUpdatePort`]: parses the update command, skips the
//! version already running, streams the image into the inactive partition
//! through [`OtaManager`], records the new version in NVS and restarts.
//! The task watchdog is fed before every read of the download.
//!
//! On the host the download is skipped; accepted requests are recorded so
//! tests can assert on them.

use log::{info, warn};

use crate::adapters::nvs::NvsAdapter;
use crate::app::ports::{FirmwareUpdatePort, PowerPort};
use crate::drivers::watchdog::Watchdog;
use crate::ota::{OtaError, OtaManager, OtaRequest};

pub struct OtaUpdater<P> {
    running_version: String,
    manager: OtaManager,
    nvs: NvsAdapter,
    power: P,
    accepted: Vec<OtaRequest>,
    last_error: Option<OtaError>,
    watchdog: Option<Watchdog>,
}

impl<P: PowerPort> OtaUpdater<P> {
    pub fn new(running_version: &str, nvs: NvsAdapter, power: P) -> Self {
        Self {
            running_version: running_version.to_owned(),
            manager: OtaManager::new(),
            nvs,
            power,
            accepted: Vec::new(),
            last_error: None,
            watchdog: None,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Watchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Requests that passed parsing and the version check.
    pub fn accepted(&self) -> &[OtaRequest] {
        &self.accepted
    }

    pub fn last_error(&self) -> Option<OtaError> {
        self.last_error
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn nvs(&self) -> &NvsAdapter {
        &self.nvs
    }

    fn apply(&mut self, req: &OtaRequest) -> Result<(), OtaError> {
        let Some(url) = req.url.as_deref() else {
            warn!("OTA: request for {} carries no image URL", req.version);
            return Err(OtaError::MalformedRequest);
        };
        self.stream_image(url)?;

        if let Err(e) = self.nvs.store_firmware_version(&req.version) {
            warn!("OTA: could not record version {} ({})", req.version, e);
        }
        info!("OTA: {} installed, restarting", req.version);
        self.power.restart();
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn stream_image(&mut self, url: &str) -> Result<(), OtaError> {
        use core::time::Duration;
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
        use esp_idf_svc::io::Read;

        use crate::drivers::watchdog;

        // A single read must return well inside the watchdog period.
        let conf = Configuration {
            timeout: Some(Duration::from_millis(u64::from(watchdog::TIMEOUT_MS / 2))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&conf).map_err(|e| {
            warn!("OTA: HTTP client init failed: {:?}", e);
            OtaError::BeginFailed
        })?;
        conn.initiate_request(Method::Get, url, &[])
            .and_then(|()| conn.initiate_response())
            .map_err(|e| {
                warn!("OTA: request to {} failed: {:?}", url, e);
                OtaError::BeginFailed
            })?;

        let status = conn.status();
        if !(200..300).contains(&status) {
            warn!("OTA: download failed with HTTP {}", status);
            return Err(OtaError::BeginFailed);
        }
        let size = conn
            .header("Content-Length")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or(OtaError::InvalidSize)?;

        // Opening the partition erases it, which outlasts the watchdog.
        let manager = &mut self.manager;
        match self.watchdog {
            Some(wd) => wd.unsupervised(|| manager.begin(size))?,
            None => manager.begin(size)?,
        }

        let watchdog = self.watchdog;
        let mut written = 0usize;
        manager.receive_image(|buf| {
            if let Some(wd) = &watchdog {
                wd.feed();
            }
            let n = conn.read(buf).map_err(|e| {
                warn!("OTA: read failed at {} bytes: {:?}", written, e);
                OtaError::WriteFailed
            })?;
            written += n;
            Ok(n)
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn stream_image(&mut self, url: &str) -> Result<(), OtaError> {
        info!("OTA(sim): download of {} skipped", url);
        Ok(())
    }
}

impl<P: PowerPort> FirmwareUpdatePort for OtaUpdater<P> {
    fn on_update_request(&mut self, payload: &str) {
        let req = match OtaRequest::parse(payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("OTA: ignoring update command ({})", e);
                self.last_error = Some(e);
                return;
            }
        };
        if !req.is_update_from(&self.running_version) {
            info!("OTA: {} already running, nothing to do", req.version);
            return;
        }

        info!(
            "OTA: update {} -> {} requested",
            self.running_version, req.version
        );
        self.accepted.push(req.clone());
        match self.apply(&req) {
            Ok(()) => self.last_error = None,
            Err(e) => {
                warn!("OTA: update to {} failed ({})", req.version, e);
                self.last_error = Some(e);
            }
        }
    }
}

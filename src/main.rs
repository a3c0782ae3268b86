//! VitalNode firmware entry point
//!
//! Hexagonal architecture with a single cooperative main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspMqttSession   SensorHub      SystemClock    LogEventSink   │
//! │  (SessionPort)    (SensorPort)   (Clock)        (EventSink)    │
//! │  OtaUpdater       SystemPower    NvsAdapter                    │
//! │  (FirmwareUpdate) (PowerPort)    (fw version record)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            TelemetryService (pure logic)               │    │
//! │  │  Connection · Router · Scheduler · Publisher · Alert   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result, anyhow};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use vitalnode::adapters::device_id;
use vitalnode::adapters::log_sink::LogEventSink;
use vitalnode::adapters::mqtt::EspMqttSession;
use vitalnode::adapters::nvs::NvsAdapter;
use vitalnode::adapters::ota_updater::OtaUpdater;
use vitalnode::adapters::power::SystemPower;
use vitalnode::adapters::time::{self, SystemClock};
use vitalnode::app::ports::{Clock, Inbox};
use vitalnode::app::service::TelemetryService;
use vitalnode::config::DeviceConfig;
use vitalnode::drivers::watchdog::{self, Watchdog};
use vitalnode::error::Error;
use vitalnode::sensors::SensorHub;
use vitalnode::{ota, pins};

const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(s) => s,
    None => "",
};
const WIFI_PASSWORD: &str = match option_env!("WIFI_PASSWORD") {
    Some(s) => s,
    None => "",
};
const WIFI_CONNECT_ATTEMPTS: u32 = 5;

/// 60 s of SNTP polling at 500 ms.
const WALL_CLOCK_MAX_POLLS: u32 = 120;

/// Inbound commands from the MQTT task to the main loop.
static INBOX: Inbox = Inbox::new();

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  VitalNode v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    ota::check_rollback();
    let watchdog = Watchdog::new();

    // ── 2. Configuration ──────────────────────────────────────
    let config = DeviceConfig::from_build_env();
    config
        .validate()
        .map_err(|e| anyhow!("invalid build configuration: {e}"))?;

    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => watchdog::fatal_restart(&Error::from(e)),
    };
    let firmware_version = nvs
        .firmware_version()
        .unwrap_or_else(|| config.firmware_version.clone());
    info!("Firmware version: {}", firmware_version);

    // ── 3. Network + wall clock ───────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let _wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition)?;
    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;

    let mut clock = SystemClock::new().with_watchdog(watchdog);
    if let Err(e) = time::wait_for_wall_clock(&mut clock, WALL_CLOCK_MAX_POLLS) {
        watchdog::fatal_restart(&e);
    }

    // ── 4. Sensors ────────────────────────────────────────────
    info!(
        "I2C: SDA=GPIO{} SCL=GPIO{} @ {} Hz",
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
        pins::I2C_FREQ_HZ
    );
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
    )?;
    let mut sensors = SensorHub::new(i2c);
    if let Err(e) = sensors.init() {
        watchdog::fatal_restart(&e);
    }

    // ── 5. Core service ───────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&config.device_id_prefix, &mac);
    info!("Device ID: {}", dev_id);

    let session = EspMqttSession::new(
        &config.broker_host,
        config.broker_port,
        &config.root_ca,
        config.inbound_buffer_len,
    )
    .with_watchdog(watchdog);
    let mut service = TelemetryService::new(session, &config, dev_id, &INBOX);
    service
        .connection_mut()
        .set_firmware_version(&firmware_version);

    let mut updater =
        OtaUpdater::new(&firmware_version, nvs, SystemPower::new()).with_watchdog(watchdog);
    let mut power = SystemPower::new();
    let mut sink = LogEventSink::new();

    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        watchdog.feed();
        service.tick(
            &mut clock,
            &mut sensors,
            &mut updater,
            &mut power,
            &mut sink,
        );
        clock.sleep_ms(config.loop_interval_ms);
    }
}

/// Bring up the Wi-Fi station.  Failure here aborts startup; the broker
/// retry loop assumes the network is already up.
fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?,
        sys_loop,
    )?;

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: WIFI_PASSWORD
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method: if WIFI_PASSWORD.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        ..Default::default()
    }))?;
    wifi.start()?;

    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!(
            "WiFi: connect attempt {}/{} to '{}'",
            attempt, WIFI_CONNECT_ATTEMPTS, WIFI_SSID
        );
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                let ip = wifi.wifi().sta_netif().get_ip_info()?;
                info!("WiFi: connected, IP {}", ip.ip);
                return Ok(wifi);
            }
            Err(e) => warn!("WiFi: attempt {} failed: {:?}", attempt, e),
        }
    }
    Err(anyhow!(
        "wifi connect failed after {} attempts",
        WIFI_CONNECT_ATTEMPTS
    ))
}

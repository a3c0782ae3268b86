fn main() {
    // Compile-time configuration overrides read by `DeviceConfig::from_build_env`
    // (WIFI_* are read by the firmware entry point).
    for var in [
        "WIFI_SSID",
        "WIFI_PASSWORD",
        "MQTT_SERVER",
        "MQTT_PORT",
        "MQTT_USER",
        "MQTT_PASSWORD",
        "MQTT_CLIENT_ID",
        "ROOT_CA",
        "MQTT_TOPIC_SUB",
        "MQTT_TOPIC_PUB",
        "OTA_TOPIC",
        "FIRMWARE_VERSION",
        "MEASURE_INTERVAL",
        "ALERT_DURATION",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}

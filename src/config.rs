//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `config/hub.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides for the deployment-sensitive fields so the same
//!     binary can run unchanged on different hosts (PORT, W1_PATH, IIO_DEVICE,
//!     POLL_INTERVAL, SENSOR_MAP, HA_URL, HA_TOKEN).
//!
//! structure:
//!     - HttpConfig: listen port for the JSON API.
//!     - PollingConfig: how often the poll loop samples the devices.
//!     - DevicesConfig: sysfs base paths and the address-to-id sensor map.
//!     - HaConfig: Home Assistant base URL and bearer token (empty = disabled).
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub ha: HaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DevicesConfig {
    /// 1-Wire bus master directory containing the 28-* device directories
    pub w1_path: String,
    /// explicit IIO device directory; empty means autodetect at startup
    pub iio_device: String,
    /// "addr1:id1,addr2:id2,..." mapping device addresses to logical ids
    pub sensor_map: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HaConfig {
    /// Home Assistant base URL (e.g. "http://homeassistant.local:8123");
    /// empty disables the push path entirely
    #[serde(default)]
    pub url: String,
    /// long-lived access token for the REST API
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: HubConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        Ok(config)
    }

    /// Load with default fallback, then apply environment overrides
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("hub.toml"),
            std::path::PathBuf::from("..").join("config").join("hub.toml"),
        ];

        let mut config = Self::default();
        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(loaded) => {
                        tracing::info!("loaded config from {}", path.display());
                        config = loaded;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config
    }

    /// Apply overrides from a key lookup (the environment in production)
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PORT") {
            match v.parse() {
                Ok(port) => self.http.port = port,
                Err(_) => tracing::warn!("ignoring invalid PORT {:?}", v),
            }
        }
        if let Some(v) = get("POLL_INTERVAL") {
            match v.parse() {
                Ok(secs) => self.polling.interval_seconds = secs,
                Err(_) => tracing::warn!("ignoring invalid POLL_INTERVAL {:?}", v),
            }
        }
        if let Some(v) = get("W1_PATH") {
            self.devices.w1_path = v;
        }
        if let Some(v) = get("IIO_DEVICE") {
            self.devices.iio_device = v;
        }
        if let Some(v) = get("SENSOR_MAP") {
            self.devices.sensor_map = v;
        }
        if let Some(v) = get("HA_URL") {
            self.ha.url = v;
        }
        if let Some(v) = get("HA_TOKEN") {
            self.ha.token = v;
        }
    }

    /// true when both the push URL and token are configured
    pub fn ha_enabled(&self) -> bool {
        !self.ha.url.is_empty() && !self.ha.token.is_empty()
    }

    /// Log the effective configuration at startup
    pub fn log_summary(&self) {
        tracing::info!(
            "config: port={} poll={}s w1={} iio={} ha={}",
            self.http.port,
            self.polling.interval_seconds,
            self.devices.w1_path,
            if self.devices.iio_device.is_empty() {
                "auto"
            } else {
                &self.devices.iio_device
            },
            if self.ha_enabled() { "enabled" } else { "disabled" },
        );
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            polling: PollingConfig::default(),
            devices: DevicesConfig::default(),
            ha: HaConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            w1_path: "/sys/devices/w1_bus_master1".to_string(),
            iio_device: String::new(),
            sensor_map: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.polling.interval_seconds, 10);
        assert_eq!(config.devices.w1_path, "/sys/devices/w1_bus_master1");
        assert!(config.devices.sensor_map.is_empty());
        assert!(!config.ha_enabled());
    }

    #[test]
    fn test_parse_full_file() {
        let raw = r#"
            [http]
            port = 9090

            [polling]
            interval_seconds = 30

            [devices]
            w1_path = "/tmp/w1"
            sensor_map = "28-aaa:hot_water_middle"

            [ha]
            url = "http://ha.local:8123"
            token = "secret"

            [logging]
            level = "debug"
        "#;
        let config: HubConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.polling.interval_seconds, 30);
        assert_eq!(config.devices.w1_path, "/tmp/w1");
        assert_eq!(config.devices.sensor_map, "28-aaa:hot_water_middle");
        assert!(config.ha_enabled());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let raw = r#"
            [polling]
            interval_seconds = 5
        "#;
        let config: HubConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.polling.interval_seconds, 5);
        assert_eq!(config.http.port, 8080);
        assert!(!config.ha_enabled());
    }

    #[test]
    fn test_overrides() {
        let mut env = HashMap::new();
        env.insert("PORT", "8888");
        env.insert("W1_PATH", "/tmp/bus");
        env.insert("SENSOR_MAP", "28-x:cellar");
        env.insert("HA_URL", "http://ha:8123");
        env.insert("HA_TOKEN", "tok");

        let mut config = HubConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.http.port, 8888);
        assert_eq!(config.devices.w1_path, "/tmp/bus");
        assert_eq!(config.devices.sensor_map, "28-x:cellar");
        assert!(config.ha_enabled());
    }

    #[test]
    fn test_invalid_override_keeps_default() {
        let mut config = HubConfig::default();
        config.apply_overrides(|key| {
            (key == "POLL_INTERVAL").then(|| "not-a-number".to_string())
        });
        assert_eq!(config.polling.interval_seconds, 10);
    }
}

//! Service configuration.
//!
//! Loaded from a YAML file with `INVSRV_`-prefixed environment overrides
//! layered on top (nested keys separated by `__`, e.g.
//! `INVSRV_MQTT__HOST`). Validation runs once at startup; everything past
//! it can trust bus references and device names.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::catalog::profile_for;
use crate::error::{InvSrvError, Result};
use crate::modbus::transport::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    /// Field buses, referenced by device entries
    pub buses: Vec<BusConfig>,

    /// Devices to identify and poll
    pub devices: Vec<DeviceConfig>,

    pub mqtt: MqttConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Log filter, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Unique bus name
    pub name: String,
    /// host:port of the Modbus TCP endpoint
    pub endpoint: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device name, becomes an MQTT topic segment
    pub name: String,
    /// Catalog profile: "atess" or "sungrow"
    pub device_type: String,
    /// Name of the bus this device hangs off
    pub bus: String,
    /// Modbus unit id
    pub unit: u8,
    /// Expected serial number, checked after identification
    #[serde(default)]
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Client id, also the state topic root
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    /// Home Assistant discovery prefix
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Pause between devices within one cycle
    #[serde(default = "default_device_pause_ms")]
    pub device_pause_ms: u64,
    /// Pause between full cycles
    #[serde(default = "default_cycle_pause_secs")]
    pub cycle_pause_secs: u64,
    /// Optional nightly sleep window
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            device_pause_ms: default_device_pause_ms(),
            cycle_pause_secs: default_cycle_pause_secs(),
            quiet_hours: None,
        }
    }
}

/// Nightly window during which polling suspends, e.g. to let meters close
/// their books undisturbed. Times are local, "HH:MM".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(
            self.max_attempts,
            self.initial_delay_ms,
            self.max_delay_ms,
            self.backoff_multiplier,
        )
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_base_topic() -> String {
    "invsrv".to_string()
}
fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}
fn default_device_pause_ms() -> u64 {
    500
}
fn default_cycle_pause_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    8
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    20_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("INVSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that cannot be expressed in serde.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(InvSrvError::config("no devices configured"));
        }

        let mut bus_names = std::collections::HashSet::new();
        for bus in &self.buses {
            if !bus_names.insert(bus.name.as_str()) {
                return Err(InvSrvError::config(format!("duplicate bus {:?}", bus.name)));
            }
            if bus.endpoint.is_empty() {
                return Err(InvSrvError::config(format!(
                    "bus {:?} has an empty endpoint",
                    bus.name
                )));
            }
        }

        let mut device_names = std::collections::HashSet::new();
        for device in &self.devices {
            if !device_names.insert(device.name.as_str()) {
                return Err(InvSrvError::config(format!(
                    "duplicate device {:?}",
                    device.name
                )));
            }
            if device.name.is_empty()
                || !device
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(InvSrvError::config(format!(
                    "device name {:?} is not topic-safe (alphanumeric, '_' and '-' only)",
                    device.name
                )));
            }
            if !bus_names.contains(device.bus.as_str()) {
                return Err(InvSrvError::config(format!(
                    "device {:?} references unknown bus {:?}",
                    device.name, device.bus
                )));
            }
            if device.unit == 0 || device.unit > 247 {
                return Err(InvSrvError::config(format!(
                    "device {:?} unit id {} outside 1..=247",
                    device.name, device.unit
                )));
            }
            // fails for unimplemented device types
            profile_for(&device.device_type)?;
        }

        if let Some(quiet) = &self.poll.quiet_hours {
            for time in [&quiet.start, &quiet.end] {
                if chrono::NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                    return Err(InvSrvError::config(format!(
                        "quiet hours time {time:?} is not HH:MM"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOOD: &str = r#"
buses:
  - name: plant
    endpoint: "192.168.1.10:502"
devices:
  - name: pcs1
    device_type: atess
    bus: plant
    unit: 1
  - name: inv1
    device_type: sungrow
    bus: plant
    unit: 2
    serial: A2290700111
mqtt:
  host: broker.local
poll:
  cycle_pause_secs: 60
  quiet_hours:
    start: "23:57"
    end: "00:05"
"#;

    fn load(yaml: &str) -> Result<Config> {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        Config::load(file.path())
    }

    #[test]
    fn full_config_loads_with_defaults() {
        let config = load(GOOD).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert_eq!(config.poll.cycle_pause_secs, 60);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.devices[1].serial.as_deref(), Some("A2290700111"));
    }

    #[test]
    fn unknown_bus_reference_is_rejected() {
        let yaml = GOOD.replace("bus: plant", "bus: nowhere");
        assert!(matches!(load(&yaml), Err(InvSrvError::Config(_))));
    }

    #[test]
    fn duplicate_device_names_are_rejected() {
        let yaml = GOOD.replace("name: inv1", "name: pcs1");
        assert!(matches!(load(&yaml), Err(InvSrvError::Config(_))));
    }

    #[test]
    fn topic_unsafe_names_are_rejected() {
        let yaml = GOOD.replace("name: pcs1", "name: \"pcs 1\"");
        assert!(matches!(load(&yaml), Err(InvSrvError::Config(_))));
    }

    #[test]
    fn unimplemented_device_type_is_rejected() {
        let yaml = GOOD.replace("device_type: atess", "device_type: growatt");
        assert!(matches!(load(&yaml), Err(InvSrvError::Config(_))));
    }

    #[test]
    fn malformed_quiet_hours_are_rejected() {
        let yaml = GOOD.replace("\"23:57\"", "\"23:97\"");
        assert!(matches!(load(&yaml), Err(InvSrvError::Config(_))));
    }

    #[test]
    fn retry_config_maps_onto_the_policy() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 8);
        assert_eq!(policy.initial_delay, std::time::Duration::from_millis(500));
        assert_eq!(policy.max_delay, std::time::Duration::from_secs(20));
    }
}

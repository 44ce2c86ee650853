/*!
Configuration management for the MCU bridge application.
*/

use anyhow::{Context, Result};
use mcu_link::protocol::{DEFAULT_BAUD_RATE, DEFAULT_RX_IDLE_SLEEP, DEFAULT_TX_INTERVAL};
use mcu_link::QueueCapacities;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            serial: SerialConfig::default(),
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial line settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path of the USB-TTL adapter
    pub port: String,

    /// Line rate, 8N1 is fixed
    pub baud_rate: u32,

    /// How long a read may block before the receive loop idles
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
        }
    }
}

/// Transmit scheduler, receive loop and queue policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Transmit tick interval in milliseconds
    pub tx_interval_ms: u64,

    /// Sleep after an empty read, in microseconds
    pub rx_idle_sleep_us: u64,

    /// Channel buffer size for decoded telemetry
    pub telemetry_buffer_size: usize,

    /// Queue the MCU configuration frames at startup
    pub send_init_sequence: bool,

    /// Log every transmitted frame at info level
    pub log_tx_frames: bool,

    /// Statistics reporting interval in seconds
    pub stats_interval_seconds: u64,

    /// Per-tier queue capacities
    pub queue_capacities: QueueCapacities,
}

impl TransportConfig {
    pub fn tx_interval(&self) -> Duration {
        Duration::from_millis(self.tx_interval_ms)
    }

    pub fn rx_idle_sleep(&self) -> Duration {
        Duration::from_micros(self.rx_idle_sleep_us)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tx_interval_ms: DEFAULT_TX_INTERVAL.as_millis() as u64,
            rx_idle_sleep_us: DEFAULT_RX_IDLE_SLEEP.as_micros() as u64,
            telemetry_buffer_size: 1000,
            send_init_sequence: true,
            log_tx_frames: false,
            stats_interval_seconds: 10,
            queue_capacities: QueueCapacities::default(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of error, warn, info, debug, trace
    pub level: String,
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
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.serial.port = "/dev/ttyACM1".to_string();
        original_config.transport.queue_capacities.low = 20;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        // Compare (using debug format since we don't have PartialEq)
        assert_eq!(format!("{:?}", original_config), format!("{:?}", loaded_config));
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.transport.tx_interval(), Duration::from_millis(2));
        assert_eq!(config.transport.rx_idle_sleep(), Duration::from_micros(100));
        assert_eq!(config.transport.queue_capacities, QueueCapacities { high: 3, mid: 5, low: 10 });
        assert!(config.transport.send_init_sequence);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "serial = 5").unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).is_err());
    }
}

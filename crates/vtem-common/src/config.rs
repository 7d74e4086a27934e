//! Configuration structures for the VTEM driver.
//!
//! Everything deserializes from TOML with defaults matching the 8-slot
//! motion-app terminal, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// How to reach the terminal.
    pub transport: TransportConfig,

    /// Register layout of the terminal.
    pub topology: TopologyConfig,
}

/// Register transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Modbus TCP to a real terminal.
    #[default]
    ModbusTcp,
    /// In-memory terminal for dry runs.
    Simulated,
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport implementation.
    pub kind: TransportKind,

    /// Terminal host name or IP address.
    pub host: String,

    /// Terminal Modbus TCP port.
    pub port: u16,

    /// Unit identifier sent in every MBAP header.
    pub unit_id: u8,

    /// Timeout for establishing the TCP connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Read/write timeout per transaction.
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::ModbusTcp,
            host: String::from("192.168.0.10"),
            port: 502,
            unit_id: 0,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(1),
        }
    }
}

impl TransportConfig {
    /// `host:port` string suitable for `ToSocketAddrs`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which checks must pass before pressure I/O on a valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuardPolicy {
    /// Only the connection is checked.
    ConnectionOnly,
    /// The slot must run the pressure motion app.
    MotionApp,
    /// The slot must run the pressure motion app with both valves active.
    #[default]
    MotionAppAndValveState,
}

/// Built-in terminal layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TopologyPreset {
    /// 8 slots with 2 valves each, addressed through motion app 03.
    #[default]
    #[serde(rename = "motion_app_8x2")]
    MotionApp8x2,
    /// 16 independently addressed valves.
    #[serde(rename = "independent_16")]
    Independent16,
}

/// Terminal topology configuration: a preset plus optional overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Layout the overrides are applied on top of.
    pub preset: TopologyPreset,

    /// Number of slots.
    pub slot_count: Option<usize>,

    /// Valves per slot.
    pub valves_per_slot: Option<usize>,

    /// First register of the input map.
    pub input_base_address: Option<u16>,

    /// First register of the output map.
    pub output_base_address: Option<u16>,

    /// Input registers per slot.
    pub input_slot_stride: Option<u16>,

    /// Output registers per slot.
    pub output_slot_stride: Option<u16>,

    /// Offset of slot 0's status word from the input base.
    pub status_register_offset: Option<u16>,

    /// Offset of slot 0's command word from the output base.
    pub command_register_offset: Option<u16>,

    /// Offset of each valve's pressure word from its slot's status/command word.
    pub pressure_register_offsets: Option<Vec<u16>>,

    /// Checks required before pressure I/O.
    pub guard_policy: Option<GuardPolicy>,
}

impl DriverConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

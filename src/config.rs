//! Configuration management
//!
//! Config file is stored next to the executable as `config.toml` unless a
//! path is given on the command line. A missing file is created with
//! defaults; an unreadable one falls back to defaults with a warning.

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_INBOUND_PREFIX, DEFAULT_PERIPHERAL_NAME, DEFAULT_TCP_ADDRESS,
    DEFAULT_TELEMETRY_UNIT,
};
use crate::error::{AppError, Result};
use crate::radio::PeripheralIdentity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub peripheral: PeripheralConfig,
    pub radio: RadioConfig,
}

// =============================================================================
// Peripheral
// =============================================================================

/// What to look for and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    /// Discovered devices must carry exactly this name
    pub expected_name: String,
    /// Inbound lines addressed to us start with this
    pub inbound_prefix: String,
    /// Sent once right after connecting (omit to disable)
    pub greeting: Option<String>,
    /// Shown after telemetry values
    pub telemetry_unit: String,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            expected_name: DEFAULT_PERIPHERAL_NAME.to_string(),
            inbound_prefix: DEFAULT_INBOUND_PREFIX.to_string(),
            greeting: Some("Hello World from rover-link!".to_string()),
            telemetry_unit: DEFAULT_TELEMETRY_UNIT.to_string(),
        }
    }
}

// =============================================================================
// Radio
// =============================================================================

/// Radio backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RadioBackend {
    /// Paired SPP peripherals exposed as serial ports
    #[default]
    Serial,
    /// Virtual peripheral over TCP (simulator)
    Tcp,
}

/// A paired peripheral and the serial port the OS bound it to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub name: String,
    pub address: String,
    /// e.g. "/dev/rfcomm0" or "COM7"
    pub port: String,
}

impl PairedDevice {
    pub fn identity(&self) -> PeripheralIdentity {
        PeripheralIdentity::new(&self.name, &self.address).with_endpoint(&self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub backend: RadioBackend,

    // =========================================================================
    // Serial backend
    // =========================================================================
    /// Baud rate of the SPP module's UART
    pub baud_rate: u32,
    /// Paired peripherals
    pub devices: Vec<PairedDevice>,

    // =========================================================================
    // TCP backend
    // =========================================================================
    /// Simulator address (host:port)
    pub tcp_address: String,
    /// Name the simulator is discovered under
    pub tcp_name: String,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            backend: RadioBackend::Serial,
            baud_rate: DEFAULT_BAUD_RATE,
            devices: Vec::new(),
            tcp_address: DEFAULT_TCP_ADDRESS.to_string(),
            tcp_name: DEFAULT_PERIPHERAL_NAME.to_string(),
        }
    }
}

impl Config {
    /// Reject values the session cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.peripheral.expected_name.is_empty() {
            return Err(AppError::ConfigValidation {
                field: "peripheral.expected_name",
                reason: "must not be empty".into(),
            });
        }
        if self.peripheral.inbound_prefix.is_empty() {
            return Err(AppError::ConfigValidation {
                field: "peripheral.inbound_prefix",
                reason: "must not be empty".into(),
            });
        }
        if let Some(greeting) = &self.peripheral.greeting {
            if greeting.is_empty() || greeting.contains('\0') {
                return Err(AppError::ConfigValidation {
                    field: "peripheral.greeting",
                    reason: "must be non-empty text without NUL".into(),
                });
            }
        }
        if let Some(d) = self.radio.devices.iter().find(|d| d.port.is_empty()) {
            return Err(AppError::ConfigValidation {
                field: "radio.devices",
                reason: format!("device '{}' has no port", d.name),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the directory holding the default config
///
/// Searches in order:
/// 1. Next to executable (production deployment)
/// 2. Up from target/release or target/debug (dev builds)
fn find_project_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| AppError::ConfigRead {
        path: PathBuf::from("executable"),
        source: e,
    })?;
    let exe_dir = exe.parent().ok_or_else(|| AppError::ConfigValidation {
        field: "exe_path",
        reason: "no parent directory".into(),
    })?;

    if exe_dir.join("config.toml").exists() {
        return Ok(exe_dir.to_path_buf());
    }

    // exe_dir = .../rover-link/target/release, we want .../rover-link
    if let Some(target_dir) = exe_dir.parent() {
        if target_dir
            .file_name()
            .map(|n| n == "target")
            .unwrap_or(false)
        {
            if let Some(project_root) = target_dir.parent() {
                if project_root.join("Cargo.toml").exists() {
                    return Ok(project_root.to_path_buf());
                }
            }
        }
    }

    Ok(exe_dir.to_path_buf())
}

/// Get the default config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(find_project_root()?.join("config.toml"))
}

/// Load config from `path`, or create it with defaults if missing
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        let config = Config::default();
        if let Err(e) = save_to(&config, path) {
            warn!("Failed to create default config: {}", e);
        }
        return config;
    }

    match fs::read_to_string(path) {
        Ok(content) => parse(&content).unwrap_or_else(|e| {
            warn!("Config parse error in {:?}: {}, using defaults", path, e);
            Config::default()
        }),
        Err(e) => {
            warn!("Failed to read config {:?}: {}, using defaults", path, e);
            Config::default()
        }
    }
}

/// Load config from the default location
pub fn load() -> Config {
    match config_path() {
        Ok(path) => load_from(&path),
        Err(e) => {
            warn!("Failed to determine config path: {}, using defaults", e);
            Config::default()
        }
    }
}

/// Parse config text
pub fn parse(content: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Save config to `path`
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| AppError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| AppError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.peripheral.expected_name, "HC-05");
        assert_eq!(config.peripheral.inbound_prefix, "BL: ");
        assert_eq!(config.peripheral.telemetry_unit, "cm");
        assert!(config.peripheral.greeting.is_some());
        assert_eq!(config.radio.backend, RadioBackend::Serial);
        assert_eq!(config.radio.baud_rate, 9600);
        assert!(config.radio.devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_toml_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            backend: RadioBackend,
        }

        let serial: Wrapper = toml::from_str("backend = \"serial\"").unwrap();
        let tcp: Wrapper = toml::from_str("backend = \"tcp\"").unwrap();
        assert_eq!(serial.backend, RadioBackend::Serial);
        assert_eq!(tcp.backend, RadioBackend::Tcp);

        let out = toml::to_string(&Wrapper {
            backend: RadioBackend::Tcp,
        })
        .unwrap();
        assert!(out.contains("backend = \"tcp\""));
    }

    #[test]
    fn test_partial_file() {
        let config = parse(
            r#"
[peripheral]
expected_name = "RC-CAR"

[[radio.devices]]
name = "RC-CAR"
address = "98:D3:31:F5:2A:10"
port = "/dev/rfcomm0"
"#,
        )
        .unwrap();

        assert_eq!(config.peripheral.expected_name, "RC-CAR");
        assert_eq!(config.peripheral.inbound_prefix, "BL: ");
        assert_eq!(config.radio.devices.len(), 1);

        let id = config.radio.devices[0].identity();
        assert_eq!(id.name, "RC-CAR");
        assert_eq!(id.endpoint.as_deref(), Some("/dev/rfcomm0"));
    }

    #[test]
    fn test_empty_file() {
        let config = parse("").unwrap();
        assert_eq!(config.peripheral.expected_name, "HC-05");
        assert_eq!(config.radio.tcp_address, "127.0.0.1:9750");
    }

    #[test]
    fn test_validate_rejects_empty_prefix() {
        let mut config = Config::default();
        config.peripheral.inbound_prefix.clear();
        assert!(matches!(
            config.validate(),
            Err(AppError::ConfigValidation {
                field: "peripheral.inbound_prefix",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_nul_greeting() {
        let mut config = Config::default();
        config.peripheral.greeting = Some("hi\0".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = std::env::temp_dir().join(format!("rover-link-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.radio.backend = RadioBackend::Tcp;
        config.peripheral.greeting = None;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path);
        assert_eq!(loaded.radio.backend, RadioBackend::Tcp);
        assert_eq!(loaded.peripheral.greeting, None);

        let _ = fs::remove_dir_all(&dir);
    }
}

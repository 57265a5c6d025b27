//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load the controller TOML
//! configuration and the driver-related core service settings.
//!
//! # Usage
//!
//! ```rust,no_run
//! use uc_common::config::{ConfigError, ConfigLoader, ControllerConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ControllerConfig::load(Path::new("uc.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_POLL_DELAY_SECS, DEFAULT_RUNTIME_DIR, DEFAULT_SLEEP_STEP_SECS, DEFAULT_TIMEOUT_SECS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields of a controller process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "uc1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Controller instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Core service settings handed to drivers.
///
/// All values are seconds, matching the driver configuration convention.
///
/// # TOML Example
///
/// ```toml
/// [drivers]
/// timeout = 5.0
/// polldelay = 0.1
/// sleep_step = 0.1
/// runtime_dir = "/opt/uc/runtime"
/// stop_on_critical = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverApiConfig {
    /// Equipment timeout passed to `get()` by scheduled updates.
    pub timeout: f64,
    /// Controller idle loop delay.
    pub polldelay: f64,
    /// Granularity of the update scheduler sleep.
    pub sleep_step: f64,
    /// Directory holding the driver snapshot file.
    pub runtime_dir: PathBuf,
    /// Shut the controller down when a driver reports a critical condition.
    pub stop_on_critical: bool,
}

impl Default for DriverApiConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            polldelay: DEFAULT_POLL_DELAY_SECS,
            sleep_step: DEFAULT_SLEEP_STEP_SECS,
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            stop_on_critical: false,
        }
    }
}

impl DriverApiConfig {
    /// Validate timings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if any timing is not a
    /// positive finite number.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("timeout", self.timeout),
            ("polldelay", self.polldelay),
            ("sleep_step", self.sleep_step),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "drivers.{name} must be a positive number of seconds, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Equipment timeout as `Duration`.
    pub fn timeout(&self) -> Duration {
        secs_or(self.timeout, DEFAULT_TIMEOUT_SECS)
    }

    /// Poll delay as `Duration`.
    pub fn polldelay(&self) -> Duration {
        secs_or(self.polldelay, DEFAULT_POLL_DELAY_SECS)
    }

    /// Scheduler sleep step as `Duration`.
    pub fn sleep_step(&self) -> Duration {
        secs_or(self.sleep_step, DEFAULT_SLEEP_STEP_SECS)
    }
}

/// Top-level controller configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Common process settings.
    pub shared: SharedConfig,
    /// Driver subsystem settings.
    #[serde(default)]
    pub drivers: DriverApiConfig,
}

impl ControllerConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.drivers.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Any serde-deserializable struct can be loaded from TOML.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Convert seconds to `Duration`, falling back when the value is unusable.
fn secs_or(secs: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        let parsed: TestWrapper = toml::from_str("level = \"warn\"").unwrap();
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.level.as_directive(), "warn");
        assert!(toml::from_str::<TestWrapper>("level = \"loud\"").is_err());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_driver_config_defaults() {
        let config = DriverApiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.sleep_step(), Duration::from_millis(100));
        assert_eq!(config.runtime_dir, PathBuf::from(DEFAULT_RUNTIME_DIR));
    }

    #[test]
    fn test_driver_config_rejects_non_positive() {
        let config = DriverApiConfig {
            sleep_step: 0.0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sleep_step"));

        let config = DriverApiConfig {
            timeout: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        // Getter never panics on bad values.
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = ControllerConfig::load(Path::new("/nonexistent/path/uc.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = ControllerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_controller_config_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "uc1"

[drivers]
timeout = 2.5
sleep_step = 0.05
runtime_dir = "/tmp/uc"
stop_on_critical = true
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.drivers.timeout(), Duration::from_millis(2500));
        assert_eq!(config.drivers.sleep_step(), Duration::from_millis(50));
        // Omitted keys keep their defaults.
        assert_eq!(config.drivers.polldelay, DEFAULT_POLL_DELAY_SECS);
        assert_eq!(config.drivers.runtime_dir, PathBuf::from("/tmp/uc"));
        assert!(config.drivers.stop_on_critical);
    }

    #[test]
    fn test_controller_config_drivers_section_optional() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[shared]\nservice_name = \"uc1\"\n").unwrap();
        file.flush().unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.drivers, DriverApiConfig::default());
        assert_eq!(config.shared.log_level, LogLevel::Info);
    }
}

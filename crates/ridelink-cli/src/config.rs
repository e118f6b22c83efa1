//! Ridelink CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `ridelink.toml` in the working directory
//! - `~/.ridelink/config.toml`
//! - environment variables (`RIDELINK_SESSION__CONNECT_TIMEOUT`, ...)
//!
//! `--config PATH` replaces the two file layers with a single file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use ridelink_ble::BleLinkConfig;
use ridelink_core::{Coordinate, Environment, SessionConfig, UserIdentity};

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the ridelink CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Session runtime configuration
    pub session: SessionConfig,

    /// BLE adapter configuration
    pub ble: BleLinkConfig,

    pub catalog: CatalogConfig,

    pub output: OutputConfig,

    pub location: LocationConfig,

    pub user: UserConfig,

    pub cli: CliConfig,
}

/// Where the firmware catalog is read from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory holding `catalog.<env>.json`; no directory means no catalog
    pub dir: Option<PathBuf>,
    pub environment: Environment,
}

/// Where finished rides are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub ride_dir: PathBuf,
}

/// Fixed rider location stamped on ride records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Identity handed to the ride sink
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            ride_dir: PathBuf::from("rides"),
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: "anonymous".to_string(),
        }
    }
}

impl LocationConfig {
    /// The configured coordinate, if both halves are set
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

impl UserConfig {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity(self.id.clone())
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration from the standard layers
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("ridelink.toml"));
        if let Some(path) = Self::default_config_path() {
            figment = figment.merge(Toml::file(path));
        }
        let figment = figment.merge(Self::env_provider());

        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, still honouring env overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Self::env_provider());

        let config: CliAppConfig = figment.extract().map_err(|e| {
            ConfigError::Loading(format!("Failed to load from {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Nested keys are separated by a double underscore since field names
    /// contain single ones
    fn env_provider() -> Env {
        Env::prefixed("RIDELINK_").split("__")
    }

    /// `~/.ridelink/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ridelink").join("config.toml"))
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.ble.lost_after == Duration::ZERO {
            return Err(ConfigError::Validation(
                "BLE lost_after must be greater than 0".to_string(),
            ));
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(ConfigError::Validation(format!(
                        "Location out of range: {}, {}",
                        latitude, longitude
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Validation(
                    "Location needs both latitude and longitude".to_string(),
                ))
            }
        }

        if self.user.id.trim().is_empty() {
            return Err(ConfigError::Validation("User id must not be empty".to_string()));
        }

        Ok(())
    }

}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("ridelink-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_config_creation() {
        let config = CliAppConfig::default();
        assert!(!config.cli.verbose);
        assert_eq!(config.catalog.environment, Environment::Production);
        assert_eq!(config.catalog.dir, None);
        assert_eq!(config.output.ride_dir, PathBuf::from("rides"));
        assert_eq!(config.location.coordinate(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = CliAppConfig::default();

        let mut invalid = config.clone();
        invalid.session.connect_timeout = Duration::ZERO;
        assert!(matches!(invalid.validate(), Err(ConfigError::Validation(_))));

        let mut invalid = config.clone();
        invalid.ble.lost_after = Duration::ZERO;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.location.latitude = Some(10.0);
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.location = LocationConfig {
            latitude: Some(91.0),
            longitude: Some(0.0),
        };
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.user.id = "  ".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_file(
            r#"
[catalog]
dir = "/var/lib/ridelink"
environment = "development"

[location]
latitude = 45.0
longitude = 9.0

[user]
id = "rider-7"
"#,
        );

        let config = CliAppConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.catalog.dir, Some(PathBuf::from("/var/lib/ridelink")));
        assert_eq!(config.catalog.environment, Environment::Development);
        assert_eq!(
            config.location.coordinate(),
            Some(Coordinate {
                latitude: 45.0,
                longitude: 9.0
            })
        );
        assert_eq!(config.user.identity(), UserIdentity("rider-7".into()));
        // untouched sections keep their defaults
        assert_eq!(config.session, SessionConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = temp_file("[user]\nid = \"\"\n");
        let result = CliAppConfig::load_from_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = CliAppConfig::load_from_file("/nonexistent/ridelink.toml");
        assert!(matches!(result, Err(ConfigError::FileSystem(_))));
    }
}

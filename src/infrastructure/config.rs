use crate::domain::{config::GatewayConfig, error::{GatewayError, GatewayResult}};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration file manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the default per-user configuration file
    pub fn new() -> GatewayResult<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// Manager for an explicit configuration file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, falling back to defaults when the file is missing
    pub fn load_config(&self) -> GatewayResult<GatewayConfig> {
        if !self.config_path.exists() {
            debug!("No config at {}, using defaults", self.config_path.display());
            return Ok(GatewayConfig::default());
        }
        self.load_config_from_path(&self.config_path)
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> GatewayResult<GatewayConfig> {
        let content = fs::read_to_string(path).map_err(|e| GatewayError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| GatewayError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &GatewayConfig) -> GatewayResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GatewayError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| GatewayError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| GatewayError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Write a default configuration file, refusing to overwrite one
    pub fn init_config(&self) -> GatewayResult<PathBuf> {
        if self.config_path.exists() {
            return Err(GatewayError::Config {
                message: format!("{} already exists", self.config_path.display()),
            });
        }
        self.save_config_to_path(&self.config_path, &GatewayConfig::default())?;
        Ok(self.config_path.clone())
    }

    fn default_config_path() -> GatewayResult<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| GatewayError::Config {
            message: "Could not determine config directory".to_string(),
        })?;

        Ok(base.join("serial-gateway").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("absent.toml"));

        let config = manager.load_config().unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_init_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(&path);

        assert_eq!(manager.init_config().unwrap(), path);
        assert!(path.exists());
        assert!(manager.init_config().is_err());

        let config = manager.load_config().unwrap();
        assert_eq!(config.port, 1234);
        assert!(config.check_signature);
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "port = \"not a number\"").unwrap();

        let manager = ConfigManager::with_path(&path);
        let err = manager.load_config().unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let manager = ConfigManager::with_path(&path);

        let config = GatewayConfig {
            port: 9000,
            check_signature: false,
            ..GatewayConfig::default()
        };
        manager.save_config_to_path(&path, &config).unwrap();
        assert_eq!(manager.load_config().unwrap(), config);
    }
}

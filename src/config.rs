//! Configuration loading: defaults, then TOML file, then environment

use crate::builder::BuilderConfig;
use crate::storage::BackendKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub backup: BackupSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub local_root: PathBuf,
    pub api_url: Option<String>,
    pub gateway_url: Option<String>,
    #[serde(skip_serializing)]
    pub jwt: Option<String>,
    /// Overrides the backend's default spacing between calls
    pub min_interval_ms: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend: BackendKind::Local,
            local_root: data_dir.join("snapvault").join("store"),
            api_url: None,
            gateway_url: None,
            jwt: None,
            min_interval_ms: None,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("local_root", &self.local_root)
            .field("api_url", &self.api_url)
            .field("gateway_url", &self.gateway_url)
            .field("jwt", &self.jwt.as_ref().map(|_| "<redacted>"))
            .field("min_interval_ms", &self.min_interval_ms)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub exclude_patterns: Vec<String>,
    pub max_file_size: Option<u64>,
    pub max_concurrent: usize,
    /// Zero disables the result cache
    pub cache_capacity: usize,
    pub follow_symlinks: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        let builder = BuilderConfig::default();
        Self {
            exclude_patterns: builder.exclude_patterns,
            max_file_size: builder.max_file_size,
            max_concurrent: builder.max_concurrent,
            cache_capacity: 0,
            follow_symlinks: builder.follow_symlinks,
        }
    }
}

impl BackupSettings {
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            exclude_patterns: self.exclude_patterns.clone(),
            max_file_size: self.max_file_size,
            max_concurrent: self.max_concurrent,
            follow_symlinks: self.follow_symlinks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration {
            reason: format!("failed to parse config: {e}"),
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Configuration {
            reason: format!("failed to serialize config: {e}"),
        })
    }

    /// `<config dir>/snapvault/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("snapvault").join("config.toml"))
    }

    /// Apply `SNAPVAULT_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("SNAPVAULT_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(root) = lookup("SNAPVAULT_STORE") {
            self.storage.local_root = PathBuf::from(root);
        }
        if let Some(url) = lookup("SNAPVAULT_API_URL") {
            self.storage.api_url = Some(url);
        }
        if let Some(url) = lookup("SNAPVAULT_GATEWAY_URL") {
            self.storage.gateway_url = Some(url);
        }
        if let Some(jwt) = lookup("SNAPVAULT_JWT") {
            self.storage.jwt = Some(jwt);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup.max_concurrent == 0 {
            return Err(Error::Configuration {
                reason: "backup.max_concurrent must be at least 1".to_string(),
            });
        }
        let needs_api = matches!(self.storage.backend, BackendKind::Pinning | BackendKind::Kubo);
        if needs_api && self.storage.api_url.is_none() {
            return Err(Error::Configuration {
                reason: format!("storage.api_url is required for the {} backend", self.storage.backend),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = Config::default();
        config.validate()?;
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(config.backup.cache_capacity, 0);
        assert!(config.backup.exclude_patterns.contains(&".git".to_string()));
        Ok(())
    }

    #[test]
    fn test_partial_toml_keeps_defaults() -> Result<()> {
        let config = Config::from_toml_str(
            r#"
            [storage]
            backend = "pinning"
            api_url = "https://api.example.com"

            [backup]
            max_concurrent = 2
            cache_capacity = 16
            "#,
        )?;
        assert_eq!(config.storage.backend, BackendKind::Pinning);
        assert_eq!(config.backup.max_concurrent, 2);
        assert_eq!(config.backup.cache_capacity, 16);
        assert_eq!(config.logging, LoggingConfig::default());
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        assert!(matches!(
            Config::from_toml_str("storage = 3"),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SNAPVAULT_BACKEND", "kubo"),
            ("SNAPVAULT_API_URL", "http://127.0.0.1:5001"),
            ("SNAPVAULT_JWT", "token"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()))?;

        assert_eq!(config.storage.backend, BackendKind::Kubo);
        assert_eq!(config.storage.api_url.as_deref(), Some("http://127.0.0.1:5001"));
        assert_eq!(config.storage.jwt.as_deref(), Some("token"));
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.backup.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.backend = BackendKind::Pinning;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_jwt_never_serialized_or_printed() -> Result<()> {
        let mut config = Config::default();
        config.storage.jwt = Some("super-secret".to_string());
        assert!(!config.to_toml_string()?.contains("super-secret"));
        assert!(!format!("{:?}", config.storage).contains("super-secret"));
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        assert!(Config::load(Some(Path::new("/no/such/snapvault.toml"))).is_err());
    }
}

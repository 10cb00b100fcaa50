//! Content-addressed storage capability and its backends.
//!
//! The core only talks to [`Storage`]. Which implementation sits behind it is
//! chosen once, at construction, through the closed [`Backend`] enum.

mod local;
mod memory;
mod rate_limit;

#[cfg(feature = "http-backends")]
mod http;
#[cfg(feature = "http-backends")]
mod kubo;
#[cfg(feature = "http-backends")]
mod pinning;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use rate_limit::RateLimiter;

#[cfg(feature = "http-backends")]
pub use kubo::KuboStore;
#[cfg(feature = "http-backends")]
pub use pinning::PinningService;

use crate::config::StorageConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Options attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    pub name: Option<String>,
    pub keyvalues: BTreeMap<String, String>,
}

impl PutOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            keyvalues: BTreeMap::new(),
        }
    }

    pub fn with_keyvalue(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keyvalues.insert(key.into(), value.into());
        self
    }
}

/// Result of an upload: the backend-assigned content address plus whatever it reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub id: String,
    pub metadata: Value,
}

/// Opaque content-addressed put/get/pin capability
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &str;

    /// Upload a JSON document and pin it
    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject>;

    /// Upload a file's bytes and pin them
    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject>;

    /// Fetch a JSON document by content address
    async fn get(&self, id: &str) -> Result<Value>;

    async fn get_metadata(&self, id: &str) -> Result<Value>;

    /// Whether `id` is pinned. Lookup failures read as `false`; authentication failures do not.
    async fn is_pinned(&self, id: &str) -> Result<bool>;

    async fn unpin(&self, id: &str) -> Result<bool>;
}

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Memory,
    Pinning,
    Kubo,
}

impl BackendKind {
    /// Default spacing between calls for this backend
    pub fn default_min_interval(&self) -> Duration {
        match self {
            Self::Local | Self::Memory => Duration::ZERO,
            Self::Pinning => Duration::from_millis(500),
            Self::Kubo => Duration::from_millis(200),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Memory => "memory",
            Self::Pinning => "pinning",
            Self::Kubo => "kubo",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            "pinning" => Ok(Self::Pinning),
            "kubo" | "ipfs" => Ok(Self::Kubo),
            other => Err(Error::Configuration {
                reason: format!("unknown storage backend '{other}'"),
            }),
        }
    }
}

/// The closed set of storage backends
#[derive(Debug)]
pub enum Backend {
    Local(LocalStore),
    Memory(MemoryStore),
    #[cfg(feature = "http-backends")]
    Pinning(PinningService),
    #[cfg(feature = "http-backends")]
    Kubo(KuboStore),
}

impl Backend {
    /// Construct the backend selected by `config`
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let interval = config
            .min_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.backend.default_min_interval());

        match config.backend {
            BackendKind::Local => Ok(Self::Local(LocalStore::with_rate_limit(
                &config.local_root,
                interval,
            )?)),
            BackendKind::Memory => Ok(Self::Memory(MemoryStore::with_rate_limit(interval))),
            #[cfg(feature = "http-backends")]
            BackendKind::Pinning => {
                let api_url = required(&config.api_url, "storage.api_url")?;
                let gateway_url = config.gateway_url.clone().unwrap_or_else(|| api_url.clone());
                Ok(Self::Pinning(PinningService::new(
                    api_url,
                    gateway_url,
                    config.jwt.clone(),
                    interval,
                )?))
            }
            #[cfg(feature = "http-backends")]
            BackendKind::Kubo => {
                let api_url = required(&config.api_url, "storage.api_url")?;
                Ok(Self::Kubo(KuboStore::new(api_url, config.jwt.clone(), interval)?))
            }
            #[cfg(not(feature = "http-backends"))]
            kind => Err(Error::Configuration {
                reason: format!("backend '{kind}' requires the http-backends feature"),
            }),
        }
    }
}

#[cfg(feature = "http-backends")]
fn required(value: &Option<String>, key: &str) -> Result<String> {
    value.clone().ok_or_else(|| Error::Configuration {
        reason: format!("{key} must be set for this backend"),
    })
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Backend::Local($store) => $call,
            Backend::Memory($store) => $call,
            #[cfg(feature = "http-backends")]
            Backend::Pinning($store) => $call,
            #[cfg(feature = "http-backends")]
            Backend::Kubo($store) => $call,
        }
    };
}

#[async_trait]
impl Storage for Backend {
    fn name(&self) -> &str {
        dispatch!(self, store => store.name())
    }

    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject> {
        dispatch!(self, store => store.put(payload, options).await)
    }

    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject> {
        dispatch!(self, store => store.put_file(path, options).await)
    }

    async fn get(&self, id: &str) -> Result<Value> {
        dispatch!(self, store => store.get(id).await)
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        dispatch!(self, store => store.get_metadata(id).await)
    }

    async fn is_pinned(&self, id: &str) -> Result<bool> {
        dispatch!(self, store => store.is_pinned(id).await)
    }

    async fn unpin(&self, id: &str) -> Result<bool> {
        dispatch!(self, store => store.unpin(id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backend_kind_parsing() -> Result<()> {
        assert_eq!("ipfs".parse::<BackendKind>()?, BackendKind::Kubo);
        assert_eq!("Local".parse::<BackendKind>()?, BackendKind::Local);
        assert!("s3".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::Pinning.default_min_interval(), Duration::from_millis(500));
        assert_eq!(BackendKind::Kubo.default_min_interval(), Duration::from_millis(200));
        Ok(())
    }

    #[tokio::test]
    async fn test_from_config_local() -> Result<()> {
        let dir = TempDir::new().map_err(|e| Error::io("tempdir", e))?;
        let config = StorageConfig {
            backend: BackendKind::Local,
            local_root: dir.path().join("store"),
            ..StorageConfig::default()
        };
        let backend = Backend::from_config(&config)?;
        assert_eq!(backend.name(), "local");

        let stored = backend
            .put(&serde_json::json!({"hello": "world"}), &PutOptions::named("t"))
            .await?;
        assert!(backend.is_pinned(&stored.id).await?);
        Ok(())
    }

    #[cfg(feature = "http-backends")]
    #[test]
    fn test_http_backend_requires_api_url() {
        let config = StorageConfig {
            backend: BackendKind::Pinning,
            api_url: None,
            ..StorageConfig::default()
        };
        assert!(matches!(
            Backend::from_config(&config),
            Err(Error::Configuration { .. })
        ));
    }
}

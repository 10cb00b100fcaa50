//! Filesystem content-addressed store with BLAKE3 addressing

use super::{PutOptions, RateLimiter, Storage, StoredObject};
use crate::error::IoResultExt;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Pin record kept next to each pinned object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PinRecord {
    id: String,
    name: Option<String>,
    keyvalues: BTreeMap<String, String>,
    size: u64,
    pinned_at: String,
}

/// Objects live under `objects/<first two hex chars>/<rest>`; pins under `pins/<id>.json`.
///
/// Unpinning removes the object as well, since nothing else collects garbage here.
#[derive(Debug)]
pub struct LocalStore {
    root_path: PathBuf,
    objects_path: PathBuf,
    pins_path: PathBuf,
    limiter: RateLimiter,
}

impl LocalStore {
    /// Create a store at `root_path`, creating its directories if needed
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        Self::with_rate_limit(root_path, Duration::ZERO)
    }

    pub fn with_rate_limit<P: AsRef<Path>>(root_path: P, min_interval: Duration) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let objects_path = root_path.join("objects");
        let pins_path = root_path.join("pins");

        fs::create_dir_all(&objects_path).at_path(&objects_path)?;
        fs::create_dir_all(&pins_path).at_path(&pins_path)?;

        Ok(Self {
            root_path,
            objects_path,
            pins_path,
            limiter: RateLimiter::new(min_interval),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn object_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.objects_path.join(&id[..2]).join(&id[2..]))
    }

    fn pin_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.pins_path.join(format!("{id}.json")))
    }

    async fn store_bytes(&self, bytes: &[u8], options: &PutOptions) -> Result<StoredObject> {
        self.limiter.wait().await;

        let id = blake3::hash(bytes).to_hex().to_string();
        let object_path = self.object_path(&id)?;

        if tokio::fs::metadata(&object_path).await.is_err() {
            if let Some(parent) = object_path.parent() {
                tokio::fs::create_dir_all(parent).await.at_path(parent)?;
            }
            // Never expose a truncated object under its final name
            let partial = object_path.with_extension("partial");
            tokio::fs::write(&partial, bytes).await.at_path(&partial)?;
            tokio::fs::rename(&partial, &object_path)
                .await
                .at_path(&object_path)?;
        }

        let pin = PinRecord {
            id: id.clone(),
            name: options.name.clone(),
            keyvalues: options.keyvalues.clone(),
            size: bytes.len() as u64,
            pinned_at: Utc::now().to_rfc3339(),
        };
        let pin_path = self.pin_path(&id)?;
        tokio::fs::write(&pin_path, serde_json::to_vec_pretty(&pin)?)
            .await
            .at_path(&pin_path)?;

        debug!("Stored object {} ({} bytes)", id, bytes.len());
        Ok(StoredObject {
            id,
            metadata: serde_json::to_value(&pin)?,
        })
    }

    async fn read_object(&self, id: &str) -> Result<Vec<u8>> {
        let object_path = self.object_path(id)?;
        let bytes = match tokio::fs::read(&object_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound { id: id.to_string() })
            }
            Err(e) => return Err(Error::io(object_path, e)),
        };

        let computed = blake3::hash(&bytes).to_hex().to_string();
        if computed != id {
            return Err(Error::integrity(format!(
                "object hash mismatch: expected {id}, got {computed}"
            )));
        }
        Ok(bytes)
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::NotFound { id: id.to_string() })
    }
}

#[async_trait]
impl Storage for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject> {
        let bytes = serde_json::to_vec(payload)?;
        self.store_bytes(&bytes, options).await
    }

    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject> {
        let bytes = tokio::fs::read(path).await.at_path(path)?;
        self.store_bytes(&bytes, options).await
    }

    async fn get(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        let bytes = self.read_object(id).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        let pin_path = self.pin_path(id)?;
        match tokio::fs::read(&pin_path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound { id: id.to_string() })
            }
            Err(e) => Err(Error::io(pin_path, e)),
        }
    }

    async fn is_pinned(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        match self.pin_path(id) {
            Ok(pin_path) => Ok(tokio::fs::metadata(pin_path).await.is_ok()),
            Err(_) => Ok(false),
        }
    }

    async fn unpin(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        let pin_path = self.pin_path(id)?;
        match tokio::fs::remove_file(&pin_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound { id: id.to_string() })
            }
            Err(e) => return Err(Error::io(pin_path, e)),
        }

        let object_path = self.object_path(id)?;
        if let Err(e) = tokio::fs::remove_file(&object_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(Error::io(object_path, e));
            }
        }
        debug!("Unpinned object {}", id);
        Ok(true)
    }
}

//! In-process store, used for tests and throwaway runs

use super::{PutOptions, RateLimiter, Storage, StoredObject};
use crate::error::IoResultExt;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    metadata: Value,
}

/// Content-addressed map keyed by BLAKE3 hex; every stored object is pinned
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, MemoryObject>>,
    limiter: RateLimiter,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::ZERO)
    }

    pub fn with_rate_limit(min_interval: Duration) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            limiter: RateLimiter::new(min_interval),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Replace the stored bytes for `id` without touching its address
    pub fn overwrite(&self, id: &str, payload: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        let mut objects = self.objects.write();
        let object = objects
            .get_mut(id)
            .ok_or_else(|| Error::NotFound { id: id.to_string() })?;
        object.bytes = bytes;
        Ok(())
    }

    async fn store_bytes(&self, bytes: Vec<u8>, options: &PutOptions) -> Result<StoredObject> {
        self.limiter.wait().await;

        let id = blake3::hash(&bytes).to_hex().to_string();
        let metadata = json!({
            "id": id,
            "name": options.name,
            "keyvalues": options.keyvalues,
            "size": bytes.len(),
            "pinnedAt": Utc::now().to_rfc3339(),
        });
        self.objects.write().insert(
            id.clone(),
            MemoryObject {
                bytes,
                metadata: metadata.clone(),
            },
        );
        Ok(StoredObject { id, metadata })
    }

    fn lookup(&self, id: &str) -> Result<MemoryObject> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }
}

#[async_trait]
impl Storage for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, payload: &Value, options: &PutOptions) -> Result<StoredObject> {
        self.store_bytes(serde_json::to_vec(payload)?, options).await
    }

    async fn put_file(&self, path: &Path, options: &PutOptions) -> Result<StoredObject> {
        let bytes = tokio::fs::read(path).await.at_path(path)?;
        self.store_bytes(bytes, options).await
    }

    async fn get(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        Ok(serde_json::from_slice(&self.lookup(id)?.bytes)?)
    }

    async fn get_metadata(&self, id: &str) -> Result<Value> {
        self.limiter.wait().await;
        Ok(self.lookup(id)?.metadata)
    }

    async fn is_pinned(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        Ok(self.objects.read().contains_key(id))
    }

    async fn unpin(&self, id: &str) -> Result<bool> {
        self.limiter.wait().await;
        match self.objects.write().remove(id) {
            Some(_) => Ok(true),
            None => Err(Error::NotFound { id: id.to_string() }),
        }
    }
}

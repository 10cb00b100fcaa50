//! Backup, restore, compare and delete on top of a [`Storage`] backend

use crate::builder::{BuilderConfig, SnapshotBuilder};
use crate::cache::ResultCache;
use crate::config::Config;
use crate::crypto::{Algorithm, Encryptor};
use crate::error::IoResultExt;
use crate::snapshot::{resolve_key, Snapshot};
use crate::storage::{Backend, PutOptions, Storage};
use crate::version::{canonical_json, digest_hex, Comparison, DetailedComparison, VersionInfo, VersionManager};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, span, warn, Instrument, Level};

/// Passphrase and algorithm used for a backup; restore must be given the same pair
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    pub key: String,
    pub algorithm: Algorithm,
}

impl EncryptionOptions {
    pub fn new(key: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            key: key.into(),
            algorithm,
        }
    }

    pub fn encryptor(&self) -> Encryptor {
        Encryptor::new(&self.key, self.algorithm)
    }
}

impl fmt::Debug for EncryptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionOptions")
            .field("key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Options for [`BackupOrchestrator::backup`]
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Defaults to `backup-<timestamp>`
    pub name: Option<String>,
    pub description: Option<String>,
    /// Defaults to `directory`
    pub backup_type: Option<String>,
    pub encryption: Option<EncryptionOptions>,
    /// Skip the result cache for this call
    pub bypass_cache: bool,
}

impl BackupOptions {
    /// Cache key for `source`; the passphrase only enters it as a digest
    fn cache_key(&self, source: &Path) -> String {
        let fingerprint = json!({
            "name": self.name,
            "description": self.description,
            "type": self.backup_type,
            "encryption": self.encryption.as_ref().map(|enc| json!({
                "algorithm": enc.algorithm,
                "keyDigest": digest_hex(enc.key.as_bytes()),
            })),
        });
        format!("{}\n{}", source.display(), canonical_json(&fingerprint))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub encryption: Option<EncryptionOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    /// Decrypts encrypted remote records before diffing
    pub encryption: Option<EncryptionOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    /// Unix milliseconds
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub backup_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version_info: VersionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupResult {
    /// Content address assigned by the storage backend
    pub hash: String,
    pub version_info: VersionInfo,
    pub name: String,
}

/// The document written through `Storage::put`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    pub data: Snapshot,
    pub metadata: BackupMetadata,
}

impl BackupPayload {
    /// Parse a document returned by storage, requiring both `data` and `metadata`
    pub fn from_value(mut value: Value) -> Result<Self> {
        let object = value
            .as_object_mut()
            .ok_or_else(|| Error::validation("stored backup is not a JSON object"))?;

        let mut take = |field: &str| match object.remove(field) {
            Some(Value::Null) | None => Err(Error::validation(format!("stored backup has no {field}"))),
            Some(inner) => Ok(inner),
        };
        let data = take("data")?;
        let metadata = take("metadata")?;

        Ok(Self {
            data: serde_json::from_value(data)
                .map_err(|e| Error::validation(format!("malformed snapshot data: {e}")))?,
            metadata: serde_json::from_value(metadata)
                .map_err(|e| Error::validation(format!("malformed backup metadata: {e}")))?,
        })
    }
}

/// Composes snapshot building, versioning and encryption with a storage backend
pub struct BackupOrchestrator<S: Storage = Backend> {
    storage: S,
    builder: SnapshotBuilder,
    versions: VersionManager,
    cache: Option<ResultCache>,
}

impl BackupOrchestrator<Backend> {
    /// Build the backend, walker settings and cache described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let storage = Backend::from_config(&config.storage)?;
        Ok(Self::new(storage, config.backup.builder_config()).with_cache(config.backup.cache_capacity))
    }
}

impl<S: Storage> BackupOrchestrator<S> {
    pub fn new(storage: S, builder_config: BuilderConfig) -> Self {
        Self {
            storage,
            builder: SnapshotBuilder::new(builder_config),
            versions: VersionManager::new(),
            cache: None,
        }
    }

    /// Enable the result cache; a capacity of zero leaves it off
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = (capacity > 0).then(|| ResultCache::new(capacity));
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Snapshot `source`, store it and return its content address
    pub async fn backup(&self, source: &Path, options: &BackupOptions) -> Result<BackupResult> {
        let cache_key = options.cache_key(source);
        if !options.bypass_cache {
            if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&cache_key)) {
                debug!("Backup cache hit for {}", source.display());
                return Ok(hit);
            }
        }

        let span = span!(Level::INFO, "backup", source = %source.display());
        async move {
            let now = Utc::now();
            let name = options
                .name
                .clone()
                .unwrap_or_else(|| format!("backup-{}", now.format("%Y%m%dT%H%M%SZ")));
            let backup_type = options
                .backup_type
                .clone()
                .unwrap_or_else(|| "directory".to_string());

            info!("Starting backup of {} as '{}'", source.display(), name);

            let encryptor = options.encryption.as_ref().map(EncryptionOptions::encryptor);
            let snapshot = self.builder.build(source, encryptor.as_ref()).await?;
            let bytes = snapshot.to_bytes()?;
            let version_info = self.versions.create_version_info(&bytes);

            let payload = BackupPayload {
                data: snapshot,
                metadata: BackupMetadata {
                    timestamp: version_info.timestamp,
                    backup_type: backup_type.clone(),
                    name: name.clone(),
                    description: options.description.clone(),
                    version_info: version_info.clone(),
                },
            };
            let put_options = PutOptions::named(name.clone())
                .with_keyvalue("type", backup_type)
                .with_keyvalue("timestamp", version_info.timestamp.to_string());

            let stored = self
                .storage
                .put(&serde_json::to_value(&payload)?, &put_options)
                .await?;
            if stored.id.trim().is_empty() {
                return Err(Error::backend(
                    self.storage.name(),
                    "upload returned no content address",
                ));
            }

            info!(
                "Backup completed: {} files, {} bytes, stored as {}",
                payload.data.len(),
                version_info.size,
                stored.id
            );

            let result = BackupResult {
                hash: stored.id,
                version_info,
                name,
            };
            if let Some(cache) = &self.cache {
                cache.insert(cache_key, result.clone());
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Write every file of backup `hash` below `target`.
    ///
    /// The first failing file aborts the restore; files written before it stay on disk.
    pub async fn restore(&self, hash: &str, target: &Path, options: &RestoreOptions) -> Result<bool> {
        let span = span!(Level::INFO, "restore", hash = %hash, target = %target.display());
        async move {
            let payload = self.fetch(hash).await?;
            info!(
                "Restoring '{}' ({} files) to {}",
                payload.metadata.name,
                payload.data.len(),
                target.display()
            );

            let encryptor = options.encryption.as_ref().map(EncryptionOptions::encryptor);
            tokio::fs::create_dir_all(target).await.at_path(target)?;

            let mut bytes_written = 0u64;
            for (key, record) in payload.data.iter() {
                let path = resolve_key(target, key)?;
                // Decrypt before touching the file so a bad key never leaves garbage behind
                let content = record.open(encryptor.as_ref(), key)?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.at_path(parent)?;
                }
                tokio::fs::write(&path, &content).await.at_path(&path)?;
                bytes_written += content.len() as u64;
                debug!("Restored {}", key);
            }

            info!(
                "Restore completed: {} files, {} bytes",
                payload.data.len(),
                bytes_written
            );
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Coarse comparison of the live tree at `source` against backup `hash`
    pub async fn compare(&self, hash: &str, source: &Path) -> Result<Comparison> {
        let payload = self.fetch(hash).await?;
        let local = self.builder.build(source, None).await?;
        let comparison = self
            .versions
            .compare_versions(&local.to_bytes()?, &payload.metadata.version_info);
        debug!(?comparison, "compared {} against {}", source.display(), hash);
        Ok(comparison)
    }

    /// Path-by-path comparison of the live tree at `source` against backup `hash`
    pub async fn compare_detailed(
        &self,
        hash: &str,
        source: &Path,
        options: &CompareOptions,
    ) -> Result<DetailedComparison> {
        let payload = self.fetch(hash).await?;
        let local = self.builder.build(source, None).await?;

        let remote = match &options.encryption {
            Some(encryption) if payload.data.has_encrypted_records() => {
                payload.data.decrypted(&encryption.encryptor())?
            }
            _ => payload.data,
        };

        let coarse = self
            .versions
            .compare_versions(&local.to_bytes()?, &payload.metadata.version_info);
        let detailed = self.versions.compare_detailed(&local, &remote)?.with_timing(&coarse);

        info!("Compared {} against {}: {}", source.display(), hash, detailed.summary());
        Ok(detailed)
    }

    /// Best-effort unpin. Returns `false` when `hash` is not pinned or unpinning fails;
    /// only authentication failures propagate.
    pub async fn delete(&self, hash: &str) -> Result<bool> {
        let pinned = match self.storage.is_pinned(hash).await {
            Ok(pinned) => pinned,
            Err(e) if e.is_authentication() => return Err(e),
            Err(e) => {
                warn!("Pin lookup for {} failed: {}", hash, e);
                return Ok(false);
            }
        };
        if !pinned {
            debug!("{} is not pinned, nothing to delete", hash);
            return Ok(false);
        }

        match self.storage.unpin(hash).await {
            Ok(unpinned) => {
                info!("Deleted backup {}", hash);
                Ok(unpinned)
            }
            Err(e) if e.is_authentication() => Err(e),
            Err(e) => {
                warn!("Unpinning {} failed: {}", hash, e);
                Ok(false)
            }
        }
    }

    /// Stored metadata for backup `hash`
    pub async fn info(&self, hash: &str) -> Result<BackupMetadata> {
        Ok(self.fetch(hash).await?.metadata)
    }

    async fn fetch(&self, hash: &str) -> Result<BackupPayload> {
        let value = self.storage.get(hash).await?;
        BackupPayload::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_cache_key_hides_passphrase() {
        let options = BackupOptions {
            encryption: Some(EncryptionOptions::new("hunter2", Algorithm::Aes256Gcm)),
            ..BackupOptions::default()
        };
        let key = options.cache_key(Path::new("/data"));
        assert!(key.starts_with("/data\n"));
        assert!(!key.contains("hunter2"));
        assert!(!format!("{options:?}").contains("hunter2"));
    }

    #[test]
    fn test_cache_key_depends_on_options() {
        let plain = BackupOptions::default();
        let named = BackupOptions {
            name: Some("nightly".to_string()),
            ..BackupOptions::default()
        };
        let source = Path::new("/data");
        assert_eq!(plain.cache_key(source), BackupOptions::default().cache_key(source));
        assert_ne!(plain.cache_key(source), named.cache_key(source));
    }

    #[test]
    fn test_payload_requires_data_and_metadata() {
        assert!(matches!(
            BackupPayload::from_value(json!({"data": {}})),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            BackupPayload::from_value(json!({"metadata": {}, "data": null})),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            BackupPayload::from_value(json!([1, 2])),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            BackupPayload::from_value(json!({"data": {}, "metadata": {"type": "directory"}})),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_metadata_wire_shape() -> Result<()> {
        let metadata = BackupMetadata {
            timestamp: 1,
            backup_type: "directory".to_string(),
            name: "n".to_string(),
            description: None,
            version_info: VersionManager::new().create_version_info(b"{}"),
        };
        let value = serde_json::to_value(&metadata)?;
        assert_eq!(value["type"], "directory");
        assert!(value["versionInfo"]["checksum"].is_string());
        assert!(value.get("description").is_none());
        Ok(())
    }

    #[test]
    fn test_with_cache_zero_disables() {
        let orchestrator = BackupOrchestrator::new(MemoryStore::new(), BuilderConfig::default()).with_cache(0);
        assert!(orchestrator.cache().is_none());
        let orchestrator = orchestrator.with_cache(8);
        assert_eq!(orchestrator.cache().map(ResultCache::capacity), Some(8));
    }
}

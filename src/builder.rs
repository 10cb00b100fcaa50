//! Snapshot construction from a directory tree

use crate::crypto::Encryptor;
use crate::error::IoResultExt;
use crate::snapshot::{mime_type_for, portable_key, FileRecord, Snapshot};
use crate::{Error, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use glob::Pattern;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, span, warn, Instrument, Level};
use walkdir::WalkDir;

/// Files at or above this size go through the buffered streaming read
pub const LARGE_FILE_THRESHOLD: u64 = 1024 * 1024;

const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for snapshot building
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Shell globs matched against each entry's file name
    pub exclude_patterns: Vec<String>,
    /// Files larger than this are skipped
    pub max_file_size: Option<u64>,
    /// Upper bound on files read and encrypted at once
    pub max_concurrent: usize,
    pub follow_symlinks: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "*.tmp".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
            ],
            max_file_size: None,
            max_concurrent: 4,
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Clone)]
struct ExcludeRule {
    raw: String,
    glob: Option<Pattern>,
}

impl ExcludeRule {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            glob: Pattern::new(raw).ok(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        name == self.raw || self.glob.as_ref().is_some_and(|glob| glob.matches(name))
    }
}

/// A regular file selected by the walk
#[derive(Debug, Clone)]
struct WalkedFile {
    key: String,
    path: PathBuf,
    size: u64,
}

/// Walks a directory and assembles a [`Snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    config: BuilderConfig,
    rules: Vec<ExcludeRule>,
}

impl SnapshotBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        let rules = config
            .exclude_patterns
            .iter()
            .map(|raw| ExcludeRule::new(raw))
            .collect();
        Self { config, rules }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Check whether an entry name matches any exclude pattern
    pub fn is_excluded(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(name))
    }

    /// Build a snapshot of `source`, encrypting every file when an encryptor is given.
    ///
    /// The first I/O failure aborts the build; nothing partial is returned.
    pub async fn build(&self, source: &Path, encryptor: Option<&Encryptor>) -> Result<Snapshot> {
        let span = span!(
            Level::INFO,
            "build_snapshot",
            source = %source.display(),
            encrypted = encryptor.is_some()
        );

        async move {
            let files = self.walk(source).await?;
            let total_bytes: u64 = files.iter().map(|f| f.size).sum();
            info!("Reading {} files ({} bytes)", files.len(), total_bytes);

            let records: Vec<(String, FileRecord)> = stream::iter(files)
                .map(|file| read_record(file, encryptor))
                .buffered(self.config.max_concurrent.max(1))
                .try_collect()
                .await?;

            let snapshot: Snapshot = records.into_iter().collect();
            info!("Snapshot built: {} files", snapshot.len());
            Ok(snapshot)
        }
        .instrument(span)
        .await
    }

    /// Depth-first walk in file-name order, pruning excluded directories
    async fn walk(&self, source: &Path) -> Result<Vec<WalkedFile>> {
        let metadata = tokio::fs::metadata(source).await.at_path(source)?;
        if !metadata.is_dir() {
            return Err(Error::io(
                source,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "source is not a directory"),
            ));
        }

        let builder = self.clone();
        let root = source.to_path_buf();
        tokio::task::spawn_blocking(move || builder.walk_blocking(&root))
            .await
            .map_err(|e| Error::io(source, std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    fn walk_blocking(&self, source: &Path) -> Result<Vec<WalkedFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(source)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded_name(entry.file_name()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let size = entry.metadata()?.len();
            if let Some(max_size) = self.config.max_file_size {
                if size > max_size {
                    debug!("Skipping large file: {} ({} bytes)", path.display(), size);
                    continue;
                }
            }

            let relative = path.strip_prefix(source).map_err(|_| {
                Error::validation(format!(
                    "{} is not under source root {}",
                    path.display(),
                    source.display()
                ))
            })?;
            let Some(key) = portable_key(relative) else {
                warn!("Skipping file without a UTF-8 path: {}", path.display());
                continue;
            };

            files.push(WalkedFile {
                key,
                path: path.to_path_buf(),
                size,
            });
        }

        Ok(files)
    }

    fn is_excluded_name(&self, name: &OsStr) -> bool {
        name.to_str().map_or(false, |name| self.is_excluded(name))
    }
}

async fn read_record(file: WalkedFile, encryptor: Option<&Encryptor>) -> Result<(String, FileRecord)> {
    let content = read_contents(&file.path, file.size).await?;
    let record = match encryptor {
        Some(encryptor) => {
            let blob = encryptor.encrypt(&content).map_err(|e| match e {
                Error::Integrity { reason } => Error::integrity(format!("{}: {reason}", file.key)),
                other => other,
            })?;
            FileRecord::encrypted(blob, mime_type_for(&file.path))
        }
        None => FileRecord::from_content(&file.path, content),
    };
    debug!("Recorded {} ({} bytes)", file.key, file.size);
    Ok((file.key, record))
}

/// Read a whole file, streaming through a buffer for large files
async fn read_contents(path: &Path, size: u64) -> Result<Vec<u8>> {
    if size < LARGE_FILE_THRESHOLD {
        return tokio::fs::read(path).await.at_path(path);
    }

    let file = tokio::fs::File::open(path).await.at_path(path)?;
    let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file);
    let mut content = Vec::with_capacity(size as usize);
    reader.read_to_end(&mut content).await.at_path(path)?;
    Ok(content)
}

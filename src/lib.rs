//! # snapvault
//!
//! Encrypted, versioned point-in-time snapshots of a directory tree, stored
//! through a pluggable content-addressed backend.
//!
//! ## Features
//!
//! - **Snapshot builder**: depth-first walk with exclusion globs, size limits and
//!   portable `/`-joined keys
//! - **Encryption**: per-file AES-256-GCM, ChaCha20-Poly1305 or AES-256-CBC under a
//!   passphrase-derived key
//! - **Versioning**: SHA-256 version hashes and canonical per-file checksums for diffs
//! - **Storage**: local content-addressed store, in-memory store, HTTP pinning
//!   service and IPFS node backends behind one trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapvault::orchestrator::{BackupOptions, BackupOrchestrator, CompareOptions, RestoreOptions};
//! use snapvault::builder::BuilderConfig;
//! use snapvault::storage::LocalStore;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> snapvault::Result<()> {
//! let store = LocalStore::new("./vault")?;
//! let vault = BackupOrchestrator::new(store, BuilderConfig::default());
//!
//! let backup = vault.backup(Path::new("./my-data"), &BackupOptions::default()).await?;
//! println!("Stored as {}", backup.hash);
//!
//! let diff = vault
//!     .compare_detailed(&backup.hash, Path::new("./my-data"), &CompareOptions::default())
//!     .await?;
//! assert!(diff.is_equal);
//!
//! vault.restore(&backup.hash, Path::new("./restored"), &RestoreOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod snapshot;
pub mod storage;
pub mod version;

// Re-export commonly used types
pub use builder::{BuilderConfig, SnapshotBuilder};
pub use config::Config;
pub use crypto::{Algorithm, Encryptor};
pub use error::{Error, Result};
pub use orchestrator::{
    BackupMetadata, BackupOptions, BackupOrchestrator, BackupResult, CompareOptions,
    EncryptionOptions, RestoreOptions,
};
pub use snapshot::{FileRecord, Snapshot};
pub use storage::{Backend, Storage};
pub use version::{DetailedComparison, Difference, VersionInfo, VersionManager};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

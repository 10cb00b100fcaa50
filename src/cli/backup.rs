//! Backup command implementation.

use super::EncryptionArgs;
use crate::config::BackupSettings;
use crate::orchestrator::{BackupOptions, BackupOrchestrator};
use crate::storage::Storage;
use crate::{Error, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the backup command
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Directory to back up
    pub source: PathBuf,

    /// Name for this backup
    #[arg(short, long)]
    pub name: Option<String>,

    /// Free-form description stored with the backup
    #[arg(short, long)]
    pub description: Option<String>,

    /// Encrypt every file (requires --key or SNAPVAULT_KEY)
    #[arg(long)]
    pub encrypt: bool,

    #[command(flatten)]
    pub encryption: EncryptionArgs,

    /// Extra exclude pattern, on top of the configured ones (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Skip files larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    pub max_file_size: Option<u64>,

    /// Ignore any cached result for an identical earlier backup
    #[arg(long)]
    pub no_cache: bool,
}

impl BackupArgs {
    /// Merge walker flags into the configured backup settings
    pub fn apply_to(&self, settings: &mut BackupSettings) {
        settings.exclude_patterns.extend(self.exclude.iter().cloned());
        if self.max_file_size.is_some() {
            settings.max_file_size = self.max_file_size;
        }
    }

    pub fn options(&self) -> Result<BackupOptions> {
        let encryption = match (self.encrypt, self.encryption.options()) {
            (true, None) => {
                return Err(Error::Configuration {
                    reason: "--encrypt needs a passphrase via --key or SNAPVAULT_KEY".to_string(),
                })
            }
            (true, options) => options,
            (false, _) => None,
        };
        Ok(BackupOptions {
            name: self.name.clone(),
            description: self.description.clone(),
            backup_type: None,
            encryption,
            bypass_cache: self.no_cache,
        })
    }
}

/// Run the backup command
pub async fn run<S: Storage>(args: BackupArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    let options = args.options()?;
    let result = orchestrator.backup(&args.source, &options).await?;

    println!("Backup completed successfully!");
    println!("  Name: {}", result.name);
    println!("  Content address: {}", result.hash);
    println!("  Version hash: {}", result.version_info.hash);
    println!("  Snapshot size: {} bytes", result.version_info.size);
    Ok(())
}

//! Restore command implementation.

use super::EncryptionArgs;
use crate::orchestrator::{BackupOrchestrator, RestoreOptions};
use crate::storage::Storage;
use crate::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the restore command
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Content address of the backup
    pub hash: String,

    /// Directory to restore into
    pub target: PathBuf,

    #[command(flatten)]
    pub encryption: EncryptionArgs,
}

/// Run the restore command
pub async fn run<S: Storage>(args: RestoreArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    let options = RestoreOptions {
        encryption: args.encryption.options(),
    };
    orchestrator.restore(&args.hash, &args.target, &options).await?;
    println!("Restored {} into {}", args.hash, args.target.display());
    Ok(())
}

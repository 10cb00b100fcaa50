//! Delete command implementation.

use crate::orchestrator::BackupOrchestrator;
use crate::storage::Storage;
use crate::Result;
use clap::Args;

/// Arguments for the delete command
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Content address of the backup
    pub hash: String,
}

/// Run the delete command
pub async fn run<S: Storage>(args: DeleteArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    if orchestrator.delete(&args.hash).await? {
        println!("Deleted backup {}", args.hash);
    } else {
        println!("Backup {} was not pinned; nothing deleted", args.hash);
    }
    Ok(())
}

//! Info command implementation.

use crate::orchestrator::BackupOrchestrator;
use crate::storage::Storage;
use crate::Result;
use clap::Args;

/// Arguments for the info command
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Content address of the backup
    pub hash: String,
}

/// Run the info command
pub async fn run<S: Storage>(args: InfoArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    let metadata = orchestrator.info(&args.hash).await?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

//! Compare and diff command implementations.

use super::EncryptionArgs;
use crate::orchestrator::{BackupOrchestrator, CompareOptions};
use crate::storage::Storage;
use crate::version::{ChangeKind, DetailedComparison};
use crate::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the compare command
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Content address of the backup
    pub hash: String,

    /// Directory to compare
    pub source: PathBuf,
}

/// Arguments for the diff command
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Content address of the backup
    pub hash: String,

    /// Directory to compare
    pub source: PathBuf,

    /// Print the full comparison as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub encryption: EncryptionArgs,
}

/// Run the compare command
pub async fn run<S: Storage>(args: CompareArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    let comparison = orchestrator.compare(&args.hash, &args.source).await?;
    let relation = if comparison.is_newer { "newer" } else { "older" };

    if comparison.is_equal {
        println!("{} matches backup {}", args.source.display(), args.hash);
    } else {
        println!("{} differs from backup {}", args.source.display(), args.hash);
    }
    println!("  Local state is {} {} than the backup", comparison.formatted_diff, relation);
    Ok(())
}

/// Run the diff command
pub async fn run_diff<S: Storage>(args: DiffArgs, orchestrator: &BackupOrchestrator<S>) -> Result<()> {
    let options = CompareOptions {
        encryption: args.encryption.options(),
    };
    let comparison = orchestrator
        .compare_detailed(&args.hash, &args.source, &options)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        print!("{}", render(&comparison));
    }
    Ok(())
}

/// Human-readable listing of a detailed comparison
pub fn render(comparison: &DetailedComparison) -> String {
    let mut out = String::new();
    for difference in &comparison.differences {
        let marker = match difference.kind {
            ChangeKind::Added => '+',
            ChangeKind::Modified => '~',
            ChangeKind::Deleted => '-',
        };
        out.push_str(&format!("{} {}\n", marker, difference.path));
    }
    out.push_str(&format!("{}\n", comparison.summary()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Difference, TotalChanges};

    #[test]
    fn test_render() {
        let comparison = DetailedComparison {
            is_equal: false,
            is_newer: true,
            time_diff: 0,
            formatted_diff: "0 seconds".to_string(),
            differences: vec![
                Difference {
                    path: "a.txt".to_string(),
                    kind: ChangeKind::Modified,
                    old_checksum: Some("x".into()),
                    new_checksum: Some("y".into()),
                    size_old: Some(5),
                    size_new: Some(5),
                },
                Difference {
                    path: "b.txt".to_string(),
                    kind: ChangeKind::Added,
                    old_checksum: None,
                    new_checksum: Some("z".into()),
                    size_old: None,
                    size_new: Some(1),
                },
            ],
            total_changes: TotalChanges {
                added: 1,
                modified: 1,
                deleted: 0,
            },
        };
        assert_eq!(
            render(&comparison),
            "~ a.txt\n+ b.txt\n1 added, 1 modified, 0 deleted\n"
        );
    }
}

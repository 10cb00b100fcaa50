//! Command-line interface for snapvault.
//!
//! Flags override environment variables, which override the config file.

use crate::config::{Config, LogFormat};
use crate::crypto::Algorithm;
use crate::orchestrator::{BackupOrchestrator, EncryptionOptions};
use crate::storage::BackendKind;
use crate::Result;
use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;

pub mod backup;
pub mod compare;
pub mod delete;
pub mod info;
pub mod restore;

/// snapvault - encrypted, versioned directory snapshots
#[derive(Parser, Debug)]
#[command(name = "snapvault")]
#[command(about = "Encrypted, versioned directory snapshots on content-addressed storage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (default: <config dir>/snapvault/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Root directory of the local store
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log debug output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Apply global flags on top of a loaded config
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(store) = &self.store {
            config.storage.local_root = store.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot a directory and store it
    Backup(backup::BackupArgs),
    /// Restore a stored snapshot into a directory
    Restore(restore::RestoreArgs),
    /// Quick check of a directory against a stored snapshot
    Compare(compare::CompareArgs),
    /// Per-file differences between a directory and a stored snapshot
    Diff(compare::DiffArgs),
    /// Unpin a stored snapshot
    Delete(delete::DeleteArgs),
    /// Show the metadata of a stored snapshot
    Info(info::InfoArgs),
}

/// Passphrase and algorithm flags shared by several commands
#[derive(Args, Clone)]
pub struct EncryptionArgs {
    /// Encryption passphrase
    #[arg(long, env = "SNAPVAULT_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Encryption algorithm
    #[arg(long, default_value = "aes-256-gcm", value_parser = parse_algorithm)]
    pub algorithm: Algorithm,
}

impl EncryptionArgs {
    pub fn options(&self) -> Option<EncryptionOptions> {
        self.key
            .as_ref()
            .map(|key| EncryptionOptions::new(key.clone(), self.algorithm))
    }
}

impl fmt::Debug for EncryptionArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionArgs")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

fn parse_algorithm(value: &str) -> std::result::Result<Algorithm, String> {
    value.parse().map_err(|e: crate::Error| e.to_string())
}

/// Dispatch a parsed command
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    if let Commands::Backup(args) = &cli.command {
        args.apply_to(&mut config.backup);
    }
    let orchestrator = BackupOrchestrator::from_config(&config)?;
    match cli.command {
        Commands::Backup(args) => backup::run(args, &orchestrator).await,
        Commands::Restore(args) => restore::run(args, &orchestrator).await,
        Commands::Compare(args) => compare::run(args, &orchestrator).await,
        Commands::Diff(args) => compare::run_diff(args, &orchestrator).await,
        Commands::Delete(args) => delete::run(args, &orchestrator).await,
        Commands::Info(args) => info::run(args, &orchestrator).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "snapvault",
            "--backend",
            "memory",
            "--store",
            "/tmp/vault",
            "delete",
            "abc",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.local_root, PathBuf::from("/tmp/vault"));
    }

    #[test]
    fn test_encryption_args() {
        let cli = Cli::parse_from([
            "snapvault",
            "restore",
            "abc",
            "/tmp/out",
            "--key",
            "pw",
            "--algorithm",
            "chacha20-poly1305",
        ]);
        match cli.command {
            Commands::Restore(args) => {
                let options = args.encryption.options().expect("key given");
                assert_eq!(options.algorithm, Algorithm::ChaCha20Poly1305);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let cli = Cli::parse_from(["snapvault", "diff", "abc", "/data", "--key", "hunter2"]);
        let rendered = format!("{cli:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }
}

use std::path::PathBuf;

use hotcopy_core::{BackupError, ConfigError};
use hotcopy_sqlite::StoreError;

/// Errors surfaced by CLI commands
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("Source database '{}' does not exist", .0.display())]
    MissingSource(PathBuf),

    #[error("Backup file '{}' already exists; pass --force to overwrite it", .0.display())]
    DestinationExists(PathBuf),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

//! `hotcopy backup`

use std::path::PathBuf;
use std::time::Duration;

use hotcopy_core::{
    AsyncBackup, BackupConfig, BackupConfigBuilder, BackupReport, SchemaName, StepSize,
    start_backup,
};
use hotcopy_sqlite::{SqliteEngine, SqliteStore, StoreConfig};
use tracing::info;

use crate::error::CliError;

/// Flags of the backup command; unset values fall back to the environment
#[derive(Debug, Clone)]
pub struct BackupArgs {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub pages: Option<StepSize>,
    pub pause: Option<Duration>,
    pub max_retries: Option<u32>,
    pub step_timeout: Option<Duration>,
    pub source_schema: Option<SchemaName>,
    pub dest_schema: Option<SchemaName>,
    pub force: bool,
}

impl BackupArgs {
    fn resolve_config(&self) -> Result<BackupConfig, CliError> {
        let mut builder = BackupConfigBuilder::from_env()?;
        if let Some(pages) = self.pages {
            builder = builder.pages_per_step(pages);
        }
        if let Some(pause) = self.pause {
            builder = builder.pause(pause);
        }
        if let Some(max_retries) = self.max_retries {
            builder = builder.max_retries(max_retries);
        }
        if self.step_timeout.is_some() {
            builder = builder.step_timeout(self.step_timeout);
        }
        if let Some(schema) = &self.source_schema {
            builder = builder.source_schema(schema.clone());
        }
        if let Some(schema) = &self.dest_schema {
            builder = builder.destination_schema(schema.clone());
        }
        Ok(builder.build()?)
    }
}

pub async fn run_backup(args: BackupArgs) -> Result<BackupReport, CliError> {
    let config = args.resolve_config()?;

    if !args.source.exists() {
        return Err(CliError::MissingSource(args.source));
    }
    if args.dest.exists() && !args.force {
        return Err(CliError::DestinationExists(args.dest));
    }

    // Busy/locked steps are retried by the driver, not waited out inside SQLite.
    let store_config = StoreConfig::no_wait();
    let source = SqliteStore::open(&args.source, &store_config)?;
    let destination = SqliteStore::open(&args.dest, &store_config)?;

    info!(
        source = %args.source.display(),
        dest = %args.dest.display(),
        pages_per_step = %config.pages_per_step,
        pause = %humantime::format_duration(config.pause),
        "Starting backup"
    );

    let session = start_backup(SqliteEngine, &source, &destination, &config)?;
    let mut backup = AsyncBackup::new(session);
    let report = backup
        .run(&config, |progress| {
            info!(
                copied = progress.copied(),
                remaining = progress.remaining,
                page_count = progress.page_count,
                percent = %format!("{:.1}", progress.percent()),
                "Backup progress"
            );
        })
        .await?;

    info!(
        session_id = %report.session_id,
        steps = report.steps,
        retries = report.retries,
        elapsed = %humantime::format_duration(report.elapsed),
        "Backup complete"
    );
    Ok(report)
}

pub fn print_report(report: &BackupReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(encoded) => println!("{}", encoded),
            Err(e) => eprintln!("Error: {}", CliError::Output(e)),
        }
        return;
    }

    // Truncated to whole milliseconds
    let elapsed = Duration::from_millis(u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX));
    println!(
        "Copied {} pages in {} steps ({} retries) in {}",
        report.page_count,
        report.steps,
        report.retries,
        humantime::format_duration(elapsed)
    );
}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use hotcopy_core::{SchemaName, SchemaNameError, StepSize};

mod backup;
mod error;
mod inspect;

use backup::{BackupArgs, run_backup};
use inspect::run_inspect;

#[derive(Parser, Debug)]
#[command(name = "hotcopy", version)]
#[command(about = "Hotcopy - incremental online backup for live SQLite databases")]
struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy a live database into a backup file, a few pages at a time
    Backup {
        /// Database to copy from
        #[arg(long)]
        source: PathBuf,
        /// Backup file to write
        #[arg(long)]
        dest: PathBuf,
        /// Pages per step: a positive count, or `all`
        #[arg(long, allow_negative_numbers = true)]
        pages: Option<StepSize>,
        /// Pause between steps, e.g. `250ms`
        #[arg(long, value_parser = humantime::parse_duration)]
        pause: Option<Duration>,
        /// Consecutive busy/locked retries before giving up
        #[arg(long)]
        max_retries: Option<u32>,
        /// Abandon the backup if one step runs longer than this
        #[arg(long, value_parser = humantime::parse_duration)]
        step_timeout: Option<Duration>,
        /// Attached database to copy from
        #[arg(long, value_parser = parse_schema)]
        source_schema: Option<SchemaName>,
        /// Attached database to copy into
        #[arg(long, value_parser = parse_schema)]
        dest_schema: Option<SchemaName>,
        /// Overwrite an existing backup file
        #[arg(long)]
        force: bool,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show page geometry and attached databases of a database file
    Inspect {
        /// Database file to inspect
        path: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_schema(value: &str) -> Result<SchemaName, SchemaNameError> {
    SchemaName::try_from(value.to_string())
}

fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Backup {
            source,
            dest,
            pages,
            pause,
            max_retries,
            step_timeout,
            source_schema,
            dest_schema,
            force,
            json,
        } => {
            let args = BackupArgs {
                source,
                dest,
                pages,
                pause,
                max_retries,
                step_timeout,
                source_schema,
                dest_schema,
                force,
            };
            match run_backup(args).await {
                Ok(report) => backup::print_report(&report, json),
                Err(e) => {
                    tracing::error!(error = %e, "Backup failed");
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Inspect { path, json } => {
            if let Err(e) = run_inspect(&path, json) {
                tracing::error!(error = %e, path = %path.display(), "Inspect failed");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

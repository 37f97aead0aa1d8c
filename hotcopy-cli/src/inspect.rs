//! `hotcopy inspect`

use std::path::Path;

use hotcopy_sqlite::{SqliteStore, StoreConfig};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedDatabase {
    pub name: String,
    pub file: String,
}

/// What a backup of this file would copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub path: String,
    pub page_size: u32,
    pub page_count: u32,
    pub size_bytes: u64,
    pub journal_mode: String,
    pub databases: Vec<AttachedDatabase>,
}

pub fn describe(path: &Path) -> Result<DatabaseInfo, CliError> {
    if !path.exists() {
        return Err(CliError::MissingSource(path.to_path_buf()));
    }

    let store = SqliteStore::open(path, &StoreConfig {
        read_only: true,
        ..StoreConfig::no_wait()
    })?;

    let page_size = store.page_size()?;
    let page_count = store.page_count()?;
    let journal_mode: String =
        store.with_connection(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))?;
    let databases = store.with_connection(|conn| {
        let mut stmt = conn.prepare("PRAGMA database_list")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AttachedDatabase {
                    name: row.get(1)?,
                    file: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>();
        rows
    })?;

    Ok(DatabaseInfo {
        path: path.display().to_string(),
        page_size,
        page_count,
        size_bytes: u64::from(page_size) * u64::from(page_count),
        journal_mode,
        databases,
    })
}

pub fn run_inspect(path: &Path, json: bool) -> Result<(), CliError> {
    let info = describe(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.path);
    println!("  page size:    {} bytes", info.page_size);
    println!("  page count:   {}", info.page_count);
    println!("  size:         {} bytes", info.size_bytes);
    println!("  journal mode: {}", info.journal_mode);
    for db in &info.databases {
        let file = if db.file.is_empty() { "(memory)" } else { db.file.as_str() };
        println!("  schema {:<8} {}", db.name, file);
    }
    Ok(())
}

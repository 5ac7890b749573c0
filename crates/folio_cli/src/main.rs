//! Command-line entry for folio allocation.
//!
//! # Responsibility
//! - Verify `folio_core` linkage and print the current week prefix.
//! - Allocate or check single folios from a shell for quick sanity checks.
//! - Start file logging before any database work.
//!
//! Logging reads `FOLIO_LOG_LEVEL` (default per build profile) and
//! `FOLIO_LOG_DIR` (absolute; otherwise `<temp>/folio_logs`). A logging
//! failure is reported on stderr and the command still runs.
//!
//! Usage:
//! - `folio_cli` prints version and current week prefix.
//! - `folio_cli next <db_path>` allocates one folio in `db_path`.
//! - `folio_cli check <folio>` prints the parsed parts or `invalid`.

use folio_core::db::open_db;
use folio_core::{FolioService, SqliteCounterStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const LOG_LEVEL_ENV: &str = "FOLIO_LOG_LEVEL";
const LOG_DIR_ENV: &str = "FOLIO_LOG_DIR";
const FALLBACK_LOG_DIR_NAME: &str = "folio_logs";

fn main() -> ExitCode {
    start_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => {
            println!("folio_core version={}", folio_core::core_version());
            println!("folio_core week_prefix={}", folio_core::current_week_prefix());
            ExitCode::SUCCESS
        }
        ["next", db_path] => match allocate(db_path) {
            Ok(folio) => {
                println!("{folio}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        ["check", text] => match folio_core::parse_folio(text) {
            Some(parts) => {
                println!(
                    "valid year={} week={} consecutive={}",
                    parts.year, parts.week, parts.consecutive
                );
                ExitCode::SUCCESS
            }
            None => {
                println!("invalid");
                ExitCode::FAILURE
            }
        },
        _ => {
            eprintln!("usage: folio_cli [next <db_path> | check <folio>]");
            ExitCode::from(2)
        }
    }
}

fn allocate(db_path: &str) -> Result<String, Box<dyn std::error::Error>> {
    let conn = open_db(db_path)?;
    let service = FolioService::new(SqliteCounterStore::try_new(&conn)?);
    Ok(service.generate_new_folio()?.into_string())
}

fn start_logging() {
    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| folio_core::default_log_level().to_string());
    let log_dir = resolve_log_dir(std::env::var(LOG_DIR_ENV).ok());

    let result = match log_dir.to_str() {
        Some(dir) => folio_core::init_logging(&level, dir),
        None => {
            eprintln!("warning: log dir `{}` is not UTF-8", log_dir.display());
            return;
        }
    };
    if let Err(err) = result {
        eprintln!("warning: logging disabled: {err}");
    }
}

/// Picks the log directory: an absolute `value`, else the temp fallback.
fn resolve_log_dir(value: Option<String>) -> PathBuf {
    value
        .map(|raw| PathBuf::from(raw.trim()))
        .filter(|path| path.is_absolute())
        .unwrap_or_else(|| fallback_log_dir(&std::env::temp_dir()))
}

fn fallback_log_dir(temp_dir: &Path) -> PathBuf {
    temp_dir.join(FALLBACK_LOG_DIR_NAME)
}

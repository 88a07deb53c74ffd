use crate::error::BodyError;
use crate::exporter::{ErrorPolicy, OutputFormat};
use chrono::{DateTime, TimeZone};
use eyre::{Context, Result};
use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Seconds between 1970-01-01T00:00:00Z and 2001-01-01T00:00:00Z.
pub const VENDOR_EPOCH_OFFSET: i64 = 978_307_200;

/// Entity types of note rows in `ZICCLOUDSYNCINGOBJECT`.
pub const DEFAULT_ENTITY_TYPES: [i64; 2] = [8, 9];

/// Configuration required to run the export process.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub db_path: PathBuf,
    pub format: OutputFormat,
    pub on_error: ErrorPolicy,
    pub entity_types: Vec<i64>,
    pub snapshot: bool,
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Written,
    Placeholder,
    Skipped,
}

/// Running totals for one export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub placeholders: usize,
    pub skipped: usize,
}

impl ExportSummary {
    pub fn record(&mut self, result: ProcessResult) {
        match result {
            ProcessResult::Written => self.written += 1,
            ProcessResult::Placeholder => self.placeholders += 1,
            ProcessResult::Skipped => self.skipped += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.placeholders + self.skipped
    }
}

/// Default location of the note store on the host machine.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|d| d.join("Library/Group Containers/group.com.apple.notes/NoteStore.sqlite"))
}

/// Inflate a gzip-framed note body. An empty blob inflates to nothing.
pub fn decompress(raw_data: &[u8]) -> Result<Vec<u8>, BodyError> {
    if raw_data.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    MultiGzDecoder::new(raw_data)
        .read_to_end(&mut out)
        .map_err(BodyError::CorruptStream)?;
    Ok(out)
}

/// Shift a vendor-epoch timestamp to UNIX seconds.
pub fn vendor_to_unix(timestamp: i64) -> Option<i64> {
    timestamp.checked_add(VENDOR_EPOCH_OFFSET)
}

/// Calendar time of a vendor-epoch timestamp in `tz`.
pub fn vendor_timestamp<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> Option<DateTime<Tz>> {
    let unix = vendor_to_unix(timestamp)?;
    DateTime::from_timestamp(unix, 0).map(|utc| utc.with_timezone(tz))
}

/// Open the store read-only. The host application never sees a write.
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open database: {}", path.display()))?;
    conn.execute_batch("PRAGMA cache_size = -16384;")
        .wrap_err("Failed to set cache_size")?;
    Ok(conn)
}

/// Pages copied per backup step, with a short pause between steps so the
/// host application can keep writing.
const BACKUP_PAGES_PER_STEP: std::ffi::c_int = 1000;
const BACKUP_STEP_PAUSE: Duration = Duration::from_millis(5);

fn snapshot_spinner(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
        .wrap_err("Invalid spinner template")?;
    let bar = ProgressBar::new_spinner()
        .with_style(style)
        .with_message("Copying note store");
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

/// Snapshot the store into a temporary file through SQLite's online backup,
/// giving a consistent read while the host application has it open.
///
/// The snapshot lives as long as the returned handle.
pub fn backup_database(db_path: &Path, quiet: bool) -> Result<NamedTempFile> {
    let snapshot = NamedTempFile::new().wrap_err("Failed to create snapshot file")?;
    let spinner = snapshot_spinner(quiet)?;

    let live = open_db(db_path)?;
    let mut copy = Connection::open(snapshot.path())
        .wrap_err_with(|| format!("Failed to open snapshot: {}", snapshot.path().display()))?;
    Backup::new(&live, &mut copy)
        .and_then(|backup| {
            backup.run_to_completion(BACKUP_PAGES_PER_STEP, BACKUP_STEP_PAUSE, None)
        })
        .wrap_err_with(|| format!("Failed to snapshot database: {}", db_path.display()))?;

    spinner.finish_and_clear();
    Ok(snapshot)
}

//! Storage - persistence gateway and artifact store
//!
//! - `SqliteGateway`: relational store for companies, scans and findings,
//!   plus the read side used to browse past results
//! - `ArtifactStore`: per-scan working files on disk, laid out as
//!   `<root>/<company>/<YYYYMMDD>/<HHMM>/`. A second run in the same minute
//!   gets `<HHMM>-2`, the next `<HHMM>-3`, and so on.

use anyhow::{bail, Result};

mod archive;
mod artifacts;
mod sqlite;

pub use archive::{CompanySummary, ScanReport};
pub use artifacts::{ArtifactStore, ScanArtifacts};
pub use sqlite::{SqliteGateway, SqliteSession};

/// Timestamp format of `scans.scan_datetime` (UTC).
pub(crate) const SCAN_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn check_digits(value: &str, len: usize, what: &str) -> Result<()> {
    if value.len() != len || !value.bytes().all(|b| b.is_ascii_digit()) {
        bail!("invalid {what} {value:?}: expected {len} digits");
    }
    Ok(())
}

/// Run key within a date: `HHMM`, or `HHMM-N` with `N >= 2`.
pub(crate) fn check_run_time(value: &str) -> Result<()> {
    let (minute, seq) = match value.split_once('-') {
        Some((minute, seq)) => (minute, Some(seq)),
        None => (value, None),
    };
    check_digits(minute, 4, "time")?;
    if let Some(seq) = seq {
        match seq.parse::<u32>() {
            Ok(n) if n >= 2 && seq.bytes().all(|b| b.is_ascii_digit()) && !seq.starts_with('0') => {}
            _ => bail!("invalid time {value:?}: expected HHMM or HHMM-N"),
        }
    }
    Ok(())
}

//! Per-scan artifact directories on the local filesystem.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{check_digits, check_run_time};

pub const HOSTS_FILE: &str = "hosts.txt";
pub const URLS_FILE: &str = "urls.txt";
pub const RESULT_FILE: &str = "result.json";

const MAX_RUNS_PER_MINUTE: u32 = 1000;

/// Root of `<company>/<YYYYMMDD>/<HHMM>[-N]/` run directories.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

/// Files of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct ScanArtifacts {
    pub dir: PathBuf,
    pub hosts: PathBuf,
    pub urls: PathBuf,
    pub result: PathBuf,
    pub date: String,
    /// Run directory name within `date`, also stored with the scan record.
    pub time: String,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, company: &str, date: &str, time: &str) -> Result<PathBuf> {
        check_component(company, "company")?;
        check_digits(date, 8, "date")?;
        check_run_time(time)?;
        Ok(self.root.join(company).join(date).join(time))
    }

    /// Reserve a fresh run directory for a scan started at `started_at`.
    ///
    /// The leaf is created with `create_dir`, so two scans of one company in
    /// the same minute never share a directory: the later one gets `HHMM-2`,
    /// then `HHMM-3`.
    pub async fn prepare(&self, company: &str, started_at: DateTime<Utc>) -> Result<ScanArtifacts> {
        let date = started_at.format("%Y%m%d").to_string();
        let minute = started_at.format("%H%M").to_string();
        self.run_dir(company, &date, &minute)?;
        let day = self.root.join(company).join(&date);
        fs::create_dir_all(&day)
            .await
            .with_context(|| format!("failed to create {}", day.display()))?;

        let mut seq = 1u32;
        let (dir, time) = loop {
            let time = if seq == 1 {
                minute.clone()
            } else {
                format!("{minute}-{seq}")
            };
            let dir = day.join(&time);
            match fs::create_dir(&dir).await {
                Ok(()) => break (dir, time),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && seq < MAX_RUNS_PER_MINUTE => {
                    seq += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", dir.display()))
                }
            }
        };
        debug!(dir = %dir.display(), "artifact directory ready");

        Ok(ScanArtifacts {
            hosts: dir.join(HOSTS_FILE),
            urls: dir.join(URLS_FILE),
            result: dir.join(RESULT_FILE),
            dir,
            date,
            time,
        })
    }

    /// `(date, time)` of every run holding a result file, newest first.
    pub async fn runs(&self, company: &str) -> Result<Vec<(String, String)>> {
        check_component(company, "company")?;
        let mut runs = Vec::new();
        for date in list_dirs(&self.root.join(company)).await? {
            for time in list_dirs(&self.root.join(company).join(&date)).await? {
                let result = self.root.join(company).join(&date).join(&time).join(RESULT_FILE);
                if fs::try_exists(&result).await.unwrap_or(false) {
                    runs.push((date.clone(), time));
                }
            }
        }
        runs.sort_unstable_by(|a, b| (&b.0, run_order(&b.1)).cmp(&(&a.0, run_order(&a.1))));
        Ok(runs)
    }

    /// Raw result file of one run, `None` when absent.
    pub async fn read_result(&self, company: &str, date: &str, time: &str) -> Result<Option<String>> {
        let path = self.run_dir(company, date, time)?.join(RESULT_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

impl ScanArtifacts {
    pub async fn write_hosts(&self, hosts: &str) -> Result<()> {
        write(&self.hosts, hosts).await
    }

    /// Start the URL list from the discovered hosts.
    pub async fn seed_urls(&self, hosts: &str) -> Result<()> {
        write(&self.urls, hosts).await
    }

    pub async fn append_urls(&self, urls: &str) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.urls)
            .await
            .with_context(|| format!("failed to open {}", self.urls.display()))?;
        file.write_all(urls.as_bytes()).await?;
        if !urls.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }

    pub async fn write_result(&self, raw: &str) -> Result<()> {
        write(&self.result, raw).await
    }
}

async fn write(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

async fn list_dirs(path: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", path.display())),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Sort key of a run directory name; `0101-10` follows `0101-9`.
fn run_order(time: &str) -> (&str, u32) {
    match time.split_once('-') {
        Some((minute, seq)) => (minute, seq.parse().unwrap_or(0)),
        None => (time, 1),
    }
}

fn check_component(value: &str, what: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        bail!("invalid {what} {value:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn prepare_lays_out_run_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let started = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        let run = store.prepare("Acme", started).await.unwrap();
        assert_eq!(run.date, "20240506");
        assert_eq!(run.time, "0708");
        assert_eq!(run.dir, tmp.path().join("Acme/20240506/0708"));
        assert!(run.dir.is_dir());
        assert_eq!(run.result.file_name().unwrap(), "result.json");
    }

    #[tokio::test]
    async fn same_minute_runs_get_their_own_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let first_at = Utc.with_ymd_and_hms(2026, 10, 19, 1, 1, 5).unwrap();
        let second_at = Utc.with_ymd_and_hms(2026, 10, 19, 1, 1, 40).unwrap();

        let first = store.prepare("Acme", first_at).await.unwrap();
        let second = store.prepare("Acme", second_at).await.unwrap();
        let third = store.prepare("Acme", second_at).await.unwrap();
        assert_eq!(first.time, "0101");
        assert_eq!(second.time, "0101-2");
        assert_eq!(third.time, "0101-3");
        assert_ne!(first.result, second.result);

        first.seed_urls("https://a.example.com\n").await.unwrap();
        first.write_result("from-first").await.unwrap();
        second.seed_urls("https://b.example.com\n").await.unwrap();
        second.write_result("from-second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&first.result).unwrap(), "from-first");
        assert_eq!(
            std::fs::read_to_string(&first.urls).unwrap(),
            "https://a.example.com\n"
        );
        assert_eq!(
            store.runs("Acme").await.unwrap(),
            vec![
                ("20261019".to_string(), "0101-2".to_string()),
                ("20261019".to_string(), "0101".to_string()),
            ]
        );
        let raw = store.read_result("Acme", "20261019", "0101-2").await.unwrap();
        assert_eq!(raw.as_deref(), Some("from-second"));
    }

    #[tokio::test]
    async fn url_list_starts_from_hosts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let run = store.prepare("Acme", Utc::now()).await.unwrap();

        run.write_hosts("https://a.example.com\n").await.unwrap();
        run.seed_urls("https://a.example.com\n").await.unwrap();
        run.append_urls("https://a.example.com/login").await.unwrap();
        run.append_urls("").await.unwrap();

        let urls = std::fs::read_to_string(&run.urls).unwrap();
        assert_eq!(
            urls,
            "https://a.example.com\nhttps://a.example.com/login\n"
        );
    }

    #[tokio::test]
    async fn runs_lists_finished_scans_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());

        let first = store
            .prepare("Acme", Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
            .await
            .unwrap();
        first.write_result("[]").await.unwrap();
        let second = store
            .prepare("Acme", Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap())
            .await
            .unwrap();
        second.write_result("{}").await.unwrap();
        // no result yet
        store
            .prepare("Acme", Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
            .await
            .unwrap();

        let runs = store.runs("Acme").await.unwrap();
        assert_eq!(
            runs,
            vec![
                ("20240102".to_string(), "0930".to_string()),
                ("20240101".to_string(), "1000".to_string()),
            ]
        );
        assert!(store.runs("Nobody").await.unwrap().is_empty());

        let raw = store.read_result("Acme", "20240102", "0930").await.unwrap();
        assert_eq!(raw.as_deref(), Some("{}"));
        assert!(store
            .read_result("Acme", "20240103", "0000")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn rejects_path_traversal() {
        let store = ArtifactStore::new("/tmp/harrow");
        assert!(store.run_dir("..", "20240101", "1000").is_err());
        assert!(store.run_dir("a/b", "20240101", "1000").is_err());
        assert!(store.run_dir("Acme", "../../x", "1000").is_err());
        assert!(store.run_dir("Acme", "20240101", "10:00").is_err());
        assert!(store.run_dir("Acme", "20240101", "1000-../x").is_err());
        assert!(store.run_dir("Acme", "20240101", "1000-2").is_ok());
    }
}

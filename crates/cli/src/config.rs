//! Application configuration: TOML file plus environment overrides.
//!
//! Lookup order for the file: `--config`, then `HARROW_CONFIG`, then
//! `harrow.toml` in the working directory. A missing default file is not an
//! error; an explicitly named one is.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::{env, fs};
use tracing::debug;

use harrow_common::EngineConfig;
use harrow_tools::Toolchain;

pub const DEFAULT_CONFIG_FILE: &str = "harrow.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine preset applied when the file has no `[engine]` table.
    pub profile: Option<String>,
    pub engine: EngineConfig,
    pub tools: Toolchain,
    pub database_url: String,
    pub artifacts_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: None,
            engine: EngineConfig::default(),
            tools: Toolchain::default(),
            database_url: "sqlite://harrow.db".to_string(),
            artifacts_root: PathBuf::from("scan_results"),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    profile: Option<String>,
    engine: Option<EngineConfig>,
    tools: Toolchain,
    database_url: Option<String>,
    artifacts_root: Option<PathBuf>,
}

impl AppConfig {
    /// Resolve, read and parse the config file, then apply the process
    /// environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("HARROW_CONFIG").map(PathBuf::from));

        let mut cfg = match named {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => match read_optional(Path::new(DEFAULT_CONFIG_FILE))? {
                Some(raw) => Self::from_toml(&raw)
                    .with_context(|| format!("failed to parse {DEFAULT_CONFIG_FILE}"))?,
                None => Self::default(),
            },
        };

        cfg.apply_env(|key| env::var(key).ok())?;
        debug!(?cfg, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(raw)?;
        let defaults = Self::default();

        let engine = match (file.engine, file.profile.as_deref()) {
            (Some(engine), _) => engine,
            (None, Some(profile)) => match EngineConfig::preset(profile) {
                Some(engine) => engine,
                None => bail!("unknown profile {profile:?}"),
            },
            (None, None) => defaults.engine,
        };

        Ok(Self {
            profile: file.profile,
            engine,
            tools: file.tools,
            database_url: file.database_url.unwrap_or(defaults.database_url),
            artifacts_root: file.artifacts_root.unwrap_or(defaults.artifacts_root),
        })
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HARROW_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("HARROW_ARTIFACTS_ROOT") {
            self.artifacts_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("SCAN_TIMEOUT") {
            self.engine.scan_timeout_secs = parse_env("SCAN_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_SCANS") {
            self.engine.max_concurrent_scans = parse_env("MAX_CONCURRENT_SCANS", &v)?;
        }
        if let Some(v) = lookup("SCAN_COOLDOWN_MINUTES") {
            let minutes: u64 = parse_env("SCAN_COOLDOWN_MINUTES", &v)?;
            self.engine.company_cooldown_secs = minutes.saturating_mul(60);
        }
        Ok(())
    }
}

/// File contents, or `None` if it does not exist. Any other read error
/// is returned.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read config {}", path.display())),
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value {value:?} for {key}"))
}

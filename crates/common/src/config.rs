//! Engine tunables.
//!
//! Durations are kept as whole seconds so the struct maps directly onto
//! TOML/JSON configuration files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of queued + running scans across all companies.
    pub max_concurrent_scans: usize,
    /// Minimum spacing between two admitted scans of the same company.
    pub company_cooldown_secs: u64,
    /// Reject a company's scan while another one of its scans is active.
    pub exclusive_company_scans: bool,
    /// Limit for the discovery and vulnerability-scan commands.
    pub stage_timeout_secs: u64,
    /// Limit for each collection tool.
    pub collection_tool_timeout_secs: u64,
    /// Wall-clock ceiling for a whole pipeline.
    pub scan_timeout_secs: u64,
    pub completed_retention_secs: u64,
    pub failed_retention_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 3,
            company_cooldown_secs: 5 * 60,
            exclusive_company_scans: false,
            stage_timeout_secs: 300,
            collection_tool_timeout_secs: 120,
            scan_timeout_secs: 300,
            completed_retention_secs: 30,
            failed_retention_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Development preset: one scan at a time, short cooldown and timeout.
    #[must_use]
    pub fn development() -> Self {
        Self {
            max_concurrent_scans: 1,
            company_cooldown_secs: 30,
            scan_timeout_secs: 60,
            stage_timeout_secs: 60,
            collection_tool_timeout_secs: 30,
            ..Self::default()
        }
    }

    /// Testing preset: near-instant cooldown and very tight limits.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            max_concurrent_scans: 1,
            company_cooldown_secs: 1,
            scan_timeout_secs: 5,
            stage_timeout_secs: 5,
            collection_tool_timeout_secs: 5,
            ..Self::default()
        }
    }

    /// Production preset: wider ceiling, long cooldown and timeout.
    #[must_use]
    pub fn production() -> Self {
        Self {
            max_concurrent_scans: 5,
            company_cooldown_secs: 15 * 60,
            scan_timeout_secs: 600,
            stage_timeout_secs: 600,
            collection_tool_timeout_secs: 300,
            ..Self::default()
        }
    }

    /// Resolve a preset by name (`development`, `testing`, `production`).
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "default" => Some(Self::development()),
            "testing" | "test" => Some(Self::testing()),
            "production" | "prod" => Some(Self::production()),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn company_cooldown(&self) -> Duration {
        Duration::from_secs(self.company_cooldown_secs)
    }

    #[inline]
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn collection_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_tool_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }

    #[inline]
    #[must_use]
    pub fn failed_retention(&self) -> Duration {
        Duration::from_secs(self.failed_retention_secs)
    }
}

//! Core data types for the Harrow scan engine
//!
//! - `ScanJob` is the registry-owned record of one admitted scan; every
//!   mutation goes through `ScanJob::apply` so the state machine lives in
//!   exactly one place.
//! - `Finding` is one normalized detection record.
//! - `Invocation` describes an external command (or a chain of commands
//!   connected through their standard streams) as argument vectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ScanError;

/// Opaque scan identifier.
pub type JobId = Uuid;

/// Lifecycle state of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Queued and running jobs count against the concurrency ceiling.
    #[inline]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }

    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Collection,
    VulnerabilityScan,
    Ingestion,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Discovery,
        Stage::Collection,
        Stage::VulnerabilityScan,
        Stage::Ingestion,
    ];

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Collection => "collection",
            Stage::VulnerabilityScan => "vulnerability_scan",
            Stage::Ingestion => "ingestion",
        }
    }

    /// Zero-based ordinal used as `ScanJob::stage_index`.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Stage::Discovery => 0,
            Stage::Collection => 1,
            Stage::VulnerabilityScan => 2,
            Stage::Ingestion => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Finding severity.
///
/// Input is matched case-insensitively against the five canonical levels;
/// anything else is kept verbatim as `Unrecognized` and never counted in
/// severity buckets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unrecognized(String),
}

impl Severity {
    /// Label used when a record carries no severity at all.
    pub const UNKNOWN: &'static str = "Unknown";

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" => Severity::Info,
            _ => Severity::Unrecognized(raw.to_string()),
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Severity::Unrecognized(Self::UNKNOWN.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Info => "Info",
            Severity::Unrecognized(raw) => raw,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        !matches!(self, Severity::Unrecognized(_))
    }
}

impl From<String> for Severity {
    fn from(raw: String) -> Self {
        Severity::parse(&raw)
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized vulnerability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub template_name: String,
    pub severity: Severity,
    pub protocol: String,
    pub target: String,
    pub details: String,
    pub cvss_score: f64,
    pub recommendation: String,
}

impl Default for Finding {
    fn default() -> Self {
        Self {
            template_name: String::new(),
            severity: Severity::unknown(),
            protocol: "http".to_string(),
            target: String::new(),
            details: String::new(),
            cvss_score: 0.0,
            recommendation: String::new(),
        }
    }
}

impl Finding {
    #[must_use]
    pub fn new<S: Into<String>>(template_name: S, severity: Severity) -> Self {
        Self {
            template_name: template_name.into(),
            severity,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_target<S: Into<String>>(mut self, target: S) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn with_cvss(mut self, score: f64) -> Self {
        self.cvss_score = score;
        self
    }
}

/// Per-severity counts over the five canonical levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityStats {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityStats {
    pub fn from_findings<'a, I>(findings: I) -> Self
    where
        I: IntoIterator<Item = &'a Finding>,
    {
        let mut stats = Self::default();
        for finding in findings {
            stats.record(&finding.severity);
        }
        stats
    }

    /// Count one severity; unrecognized values are ignored.
    pub fn record(&mut self, severity: &Severity) {
        self.add(severity, 1);
    }

    pub fn add(&mut self, severity: &Severity, count: usize) {
        let bucket = match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
            Severity::Unrecognized(_) => return,
        };
        *bucket = bucket.saturating_add(count);
    }

    pub fn merge(&mut self, other: &SeverityStats) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.info += other.info;
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Outcome attached to a job when it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub findings: usize,
    pub statistics: SeverityStats,
    pub result_artifact: PathBuf,
    /// False when findings exist only in the artifact store.
    pub persisted: bool,
}

/// A mutation of a job, applied atomically by the registry.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Start { progress: u8 },
    Advance { stage: Stage, progress: u8 },
    Complete(ScanSummary),
    Fail(String),
}

impl JobUpdate {
    fn label(&self) -> &'static str {
        match self {
            JobUpdate::Start { .. } => "start",
            JobUpdate::Advance { .. } => "advance",
            JobUpdate::Complete(_) => "complete",
            JobUpdate::Fail(_) => "fail",
        }
    }
}

/// Registry record of one admitted scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    pub company: String,
    pub target: String,
    pub state: JobState,
    pub progress: u8,
    pub stage_index: usize,
    pub created_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub summary: Option<ScanSummary>,
}

impl ScanJob {
    #[must_use]
    pub fn new<C: Into<String>, T: Into<String>>(company: C, target: T) -> Self {
        Self::with_id(Uuid::new_v4(), company, target)
    }

    #[must_use]
    pub fn with_id<C: Into<String>, T: Into<String>>(id: JobId, company: C, target: T) -> Self {
        Self {
            id,
            company: company.into(),
            target: target.into(),
            state: JobState::Queued,
            progress: 0,
            stage_index: 0,
            created_at: Utc::now(),
            terminal_at: None,
            error: None,
            summary: None,
        }
    }

    /// Apply one update, enforcing the state machine.
    ///
    /// Progress never decreases while the job is running; a lower value is
    /// clamped to the current one. Only `Complete` may report 100.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), ScanError> {
        let illegal = |from: JobState, update: &JobUpdate| ScanError::InvalidTransition {
            from,
            update: update.label(),
        };

        match (self.state, update) {
            (JobState::Queued, JobUpdate::Start { progress }) => {
                self.state = JobState::Running;
                self.progress = self.progress.max(progress.min(99));
            }
            (JobState::Running, JobUpdate::Advance { stage, progress }) => {
                self.stage_index = self.stage_index.max(stage.index());
                self.progress = self.progress.max(progress.min(99));
            }
            (JobState::Running, JobUpdate::Complete(summary)) => {
                self.state = JobState::Completed;
                self.progress = 100;
                self.terminal_at = Some(Utc::now());
                self.summary = Some(summary);
            }
            (JobState::Queued | JobState::Running, JobUpdate::Fail(message)) => {
                self.state = JobState::Failed;
                self.progress = 0;
                self.terminal_at = Some(Utc::now());
                self.error = Some(message);
            }
            (from, update) => return Err(illegal(from, &update)),
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Status of a persisted scan record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanRecordStatus {
    Initializing,
    Running,
    Completed,
    Failed,
}

impl ScanRecordStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ScanRecordStatus::Initializing => "initializing",
            ScanRecordStatus::Running => "running",
            ScanRecordStatus::Completed => "completed",
            ScanRecordStatus::Failed => "failed",
        }
    }
}

/// One program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    #[must_use]
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A command, or a chain of commands wired stdout-to-stdin.
///
/// `stdin` is fed to the first command only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub label: String,
    pub commands: Vec<CommandSpec>,
    pub stdin: Option<String>,
}

impl Invocation {
    #[must_use]
    pub fn single<S: Into<String>>(label: S, command: CommandSpec) -> Self {
        Self {
            label: label.into(),
            commands: vec![command],
            stdin: None,
        }
    }

    #[must_use]
    pub fn chain<S: Into<String>>(label: S, commands: Vec<CommandSpec>) -> Self {
        Self {
            label: label.into(),
            commands,
            stdin: None,
        }
    }

    #[must_use]
    pub fn with_stdin<S: Into<String>>(mut self, input: S) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, command) in self.commands.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{command}")?;
        }
        Ok(())
    }
}

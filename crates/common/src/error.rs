//! Error types for the Harrow scan engine
//!
//! `ScanError` carries the engine-level taxonomy; `CommandError` is what the
//! command runner reports for a single external invocation.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::{JobId, JobState, Stage};

/// Why an admission attempt was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("concurrency ceiling reached")]
    ConcurrencyCeiling,

    #[error("company cooldown active ({}s remaining)", .remaining.as_secs())]
    Cooldown { remaining: Duration },

    #[error("a scan for this company is already active")]
    CompanyBusy,
}

impl RejectReason {
    /// Stable label for metrics.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RejectReason::ConcurrencyCeiling => "concurrency_ceiling",
            RejectReason::Cooldown { .. } => "cooldown",
            RejectReason::CompanyBusy => "company_busy",
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("admission rejected: {0}")]
    AdmissionRejected(RejectReason),

    #[error("{} stage failed: {message}", .stage.name())]
    StageFatal { stage: Stage, message: String },

    #[error("collection tool {tool} failed: {message}")]
    StageSoft { tool: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("scan job {0} not found")]
    NotFound(JobId),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid company name: {0}")]
    InvalidCompany(String),

    #[error("illegal transition from {from} ({update})")]
    InvalidTransition { from: JobState, update: &'static str },

    #[error("scan exceeded overall timeout of {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ScanError {
    /// Rejections are expected outcomes of admission, not faults.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, ScanError::AdmissionRejected(_))
    }
}

impl From<RejectReason> for ScanError {
    fn from(reason: RejectReason) -> Self {
        ScanError::AdmissionRejected(reason)
    }
}

/// Result type alias for engine operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Failure of one external command or command pipeline.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invocation has no commands")]
    EmptyInvocation,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {}: {}", exit_label(.code), .stderr.trim())]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

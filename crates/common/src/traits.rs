//! Collaborator traits for the Harrow scan engine
//!
//! The engine talks to the outside world through two seams:
//! - `ToolRunner` executes external programs
//! - `PersistenceGateway` hands out one `PersistenceSession` (one
//!   transaction) per job ingestion

use crate::error::CommandError;
use crate::types::{Finding, Invocation, ScanRecordStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Executes an invocation and returns its captured standard output.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion or until `limit` elapses.
    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<String, CommandError>;

    /// Runner name/identifier
    fn name(&self) -> &str {
        "runner"
    }
}

/// Source of persistence sessions. Never shared across jobs: each ingestion
/// opens its own session.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn PersistenceSession>>;
}

/// One unit of work against the relational store.
#[async_trait]
pub trait PersistenceSession: Send {
    /// Insert the company if missing and return its id.
    async fn upsert_company(&mut self, name: &str) -> Result<i64>;

    /// `started_at` gives the record's date and `run_time` its run directory
    /// name within that date (`HHMM` or `HHMM-N`), so lookups by date and
    /// time resolve to exactly one scan.
    async fn create_scan_record(
        &mut self,
        company_id: i64,
        target: &str,
        domain_file: &str,
        started_at: DateTime<Utc>,
        run_time: &str,
    ) -> Result<i64>;

    async fn append_finding(&mut self, scan_id: i64, finding: &Finding) -> Result<()>;

    async fn update_scan_record_status(
        &mut self,
        scan_id: i64,
        status: ScanRecordStatus,
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

//! SQLite persistence gateway

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

use harrow_common::{Finding, PersistenceGateway, PersistenceSession, ScanRecordStatus};

use crate::SCAN_DATETIME_FORMAT;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool-backed gateway. Cloning shares the pool; each ingestion still gets
/// its own transaction through `open_session`.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    /// Open (creating if missing) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database {url}"))?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        info!(url, "database ready");
        Ok(gateway)
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory database")?;

        let gateway = Self { pool };
        gateway.migrate().await?;
        Ok(gateway)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn open_session(&self) -> Result<Box<dyn PersistenceSession>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;
        Ok(Box::new(SqliteSession { tx }))
    }
}

/// One transaction; dropped without commit means rolled back.
pub struct SqliteSession {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl PersistenceSession for SqliteSession {
    async fn upsert_company(&mut self, name: &str) -> Result<i64> {
        sqlx::query("INSERT INTO companies (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("failed to insert company {name}"))?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM companies WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .with_context(|| format!("failed to look up company {name}"))?;
        Ok(id)
    }

    async fn create_scan_record(
        &mut self,
        company_id: i64,
        target: &str,
        domain_file: &str,
        started_at: DateTime<Utc>,
        run_time: &str,
    ) -> Result<i64> {
        let inserted = sqlx::query(
            "INSERT INTO scans \
             (company_id, target_domain, status, domain_file, scan_datetime, run_time) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(company_id)
        .bind(target)
        .bind(ScanRecordStatus::Initializing.as_str())
        .bind(domain_file)
        .bind(started_at.format(SCAN_DATETIME_FORMAT).to_string())
        .bind(run_time)
        .execute(&mut *self.tx)
        .await
        .context("failed to insert scan record")?;

        let scan_id = inserted.last_insert_rowid();
        debug!(scan_id, company_id, target, "scan record created");
        Ok(scan_id)
    }

    async fn append_finding(&mut self, scan_id: i64, finding: &Finding) -> Result<()> {
        sqlx::query(
            "INSERT INTO scan_results \
             (scan_id, template_name, severity, protocol, target, details, cvss_score, recommendation) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(scan_id)
        .bind(&finding.template_name)
        .bind(finding.severity.as_str())
        .bind(&finding.protocol)
        .bind(&finding.target)
        .bind(&finding.details)
        .bind(finding.cvss_score)
        .bind(&finding.recommendation)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("failed to insert finding {}", finding.template_name))?;
        Ok(())
    }

    async fn update_scan_record_status(
        &mut self,
        scan_id: i64,
        status: ScanRecordStatus,
    ) -> Result<()> {
        let updated = sqlx::query("UPDATE scans SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(scan_id)
            .execute(&mut *self.tx)
            .await
            .context("failed to update scan status")?;
        if updated.rows_affected() == 0 {
            bail!("scan record {scan_id} does not exist");
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("failed to commit")?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("failed to roll back")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harrow_common::Severity;

    async fn count(gateway: &SqliteGateway, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(gateway.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn session_persists_scan_and_findings() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        let mut session = gateway.open_session().await.unwrap();

        let acme = session.upsert_company("Acme").await.unwrap();
        assert_eq!(session.upsert_company("Acme").await.unwrap(), acme);

        let scan_id = session
            .create_scan_record(acme, "example.com", "/tmp/urls.txt", Utc::now(), "1200")
            .await
            .unwrap();
        session
            .update_scan_record_status(scan_id, ScanRecordStatus::Running)
            .await
            .unwrap();
        session
            .append_finding(scan_id, &Finding::new("xss-1", Severity::High).with_cvss(6.1))
            .await
            .unwrap();
        session
            .update_scan_record_status(scan_id, ScanRecordStatus::Completed)
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(count(&gateway, "companies").await, 1);
        assert_eq!(count(&gateway, "scan_results").await, 1);
        let status: String = sqlx::query_scalar("SELECT status FROM scans WHERE id = ?")
            .bind(scan_id)
            .fetch_one(gateway.pool())
            .await
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        let mut session = gateway.open_session().await.unwrap();
        let id = session.upsert_company("Acme").await.unwrap();
        session
            .create_scan_record(id, "example.com", "", Utc::now(), "1200")
            .await
            .unwrap();
        session.rollback().await.unwrap();

        assert_eq!(count(&gateway, "companies").await, 0);
        assert_eq!(count(&gateway, "scans").await, 0);
    }

    #[tokio::test]
    async fn status_update_of_unknown_scan_fails() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        let mut session = gateway.open_session().await.unwrap();
        let err = session
            .update_scan_record_status(99, ScanRecordStatus::Failed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("99"));
    }
}

//! Read side: browse persisted scans by company, date and time of day.
//!
//! Dates are `YYYYMMDD` (UTC) and times are the run directory names stored
//! with each scan (`HHMM`, or `HHMM-N` for later runs in the same minute),
//! so every date/time pair names at most one scan.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashMap;

use harrow_common::{Finding, Severity, SeverityStats};

use crate::{check_digits, check_run_time, SqliteGateway};

/// Per-company overview.
#[derive(Debug, Clone, Serialize)]
pub struct CompanySummary {
    pub id: i64,
    pub name: String,
    pub total_scans: i64,
    /// `YYYY-MM-DD HH:MM:SS` of the newest scan.
    pub last_scan: Option<String>,
    pub vulnerabilities: SeverityStats,
}

/// Findings of one scan with severity buckets.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub scan_id: i64,
    pub target_domain: String,
    pub status: String,
    pub findings: Vec<Finding>,
    pub statistics: SeverityStats,
}

#[derive(FromRow)]
struct FindingRow {
    template_name: String,
    severity: String,
    protocol: String,
    target: String,
    details: String,
    cvss_score: f64,
    recommendation: String,
}

impl From<FindingRow> for Finding {
    fn from(row: FindingRow) -> Self {
        Finding {
            template_name: row.template_name,
            severity: Severity::parse(&row.severity),
            protocol: row.protocol,
            target: row.target,
            details: row.details,
            cvss_score: row.cvss_score,
            recommendation: row.recommendation,
        }
    }
}

/// Run key of a scan row; rows written before `run_time` existed fall back
/// to the minute of `scan_datetime`.
const RUN_TIME: &str = "COALESCE(NULLIF(s.run_time, ''), strftime('%H%M', s.scan_datetime))";

impl SqliteGateway {
    /// All companies with scan counts and severity totals, ordered by name.
    pub async fn companies(&self) -> Result<Vec<CompanySummary>> {
        let rows: Vec<(i64, String, i64, Option<String>)> = sqlx::query_as(
            "SELECT c.id, c.name, COUNT(s.id), MAX(s.scan_datetime) \
             FROM companies c LEFT JOIN scans s ON s.company_id = c.id \
             GROUP BY c.id, c.name ORDER BY c.name",
        )
        .fetch_all(self.pool())
        .await
        .context("failed to list companies")?;

        let counts: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT s.company_id, sr.severity, COUNT(*) \
             FROM scan_results sr JOIN scans s ON sr.scan_id = s.id \
             GROUP BY s.company_id, sr.severity",
        )
        .fetch_all(self.pool())
        .await
        .context("failed to count findings")?;

        let mut buckets: HashMap<i64, SeverityStats> = HashMap::new();
        for (company_id, severity, n) in counts {
            buckets
                .entry(company_id)
                .or_default()
                .add(&Severity::parse(&severity), usize::try_from(n).unwrap_or(0));
        }

        Ok(rows
            .into_iter()
            .map(|(id, name, total_scans, last_scan)| CompanySummary {
                id,
                name,
                total_scans,
                last_scan,
                vulnerabilities: buckets.remove(&id).unwrap_or_default(),
            })
            .collect())
    }

    /// Scan dates for a company, newest first. `None` if the company is unknown.
    pub async fn scan_dates(&self, company: &str) -> Result<Option<Vec<String>>> {
        let Some(company_id) = self.company_id(company).await? else {
            return Ok(None);
        };
        let dates: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT strftime('%Y%m%d', scan_datetime) AS d \
             FROM scans WHERE company_id = ? ORDER BY d DESC",
        )
        .bind(company_id)
        .fetch_all(self.pool())
        .await
        .context("failed to list scan dates")?;
        Ok(Some(dates))
    }

    /// Scan times on one date, newest first. `None` if the company is unknown.
    pub async fn scan_times(&self, company: &str, date: &str) -> Result<Option<Vec<String>>> {
        check_digits(date, 8, "date")?;
        let Some(company_id) = self.company_id(company).await? else {
            return Ok(None);
        };
        let times: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT {RUN_TIME} FROM scans s \
             WHERE s.company_id = ? AND strftime('%Y%m%d', s.scan_datetime) = ? \
             ORDER BY s.scan_datetime DESC, s.id DESC"
        ))
        .bind(company_id)
        .bind(date)
        .fetch_all(self.pool())
        .await
        .context("failed to list scan times")?;
        Ok(Some(times))
    }

    /// Findings of the scan at `date`/`time`. `None` if no such scan.
    pub async fn scan_report(
        &self,
        company: &str,
        date: &str,
        time: &str,
    ) -> Result<Option<ScanReport>> {
        check_digits(date, 8, "date")?;
        check_run_time(time)?;

        let scan: Option<(i64, String, String)> = sqlx::query_as(&format!(
            "SELECT s.id, s.target_domain, s.status \
             FROM scans s JOIN companies c ON c.id = s.company_id \
             WHERE c.name = ? \
               AND strftime('%Y%m%d', s.scan_datetime) = ? \
               AND {RUN_TIME} = ? \
             ORDER BY s.id DESC LIMIT 1"
        ))
        .bind(company)
        .bind(date)
        .bind(time)
        .fetch_optional(self.pool())
        .await
        .context("failed to look up scan")?;

        let Some((scan_id, target_domain, status)) = scan else {
            return Ok(None);
        };

        let rows: Vec<FindingRow> = sqlx::query_as(
            "SELECT template_name, severity, protocol, target, details, cvss_score, recommendation \
             FROM scan_results WHERE scan_id = ? ORDER BY cvss_score DESC, id",
        )
        .bind(scan_id)
        .fetch_all(self.pool())
        .await
        .context("failed to load findings")?;

        let findings: Vec<Finding> = rows.into_iter().map(Finding::from).collect();
        let statistics = SeverityStats::from_findings(&findings);
        Ok(Some(ScanReport {
            scan_id,
            target_domain,
            status,
            findings,
            statistics,
        }))
    }

    async fn company_id(&self, company: &str) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT id FROM companies WHERE name = ?")
            .bind(company)
            .fetch_optional(self.pool())
            .await
            .context("failed to look up company")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use harrow_common::{PersistenceGateway, ScanRecordStatus};

    async fn seed(gateway: &SqliteGateway) {
        let mut session = gateway.open_session().await.unwrap();
        let acme = session.upsert_company("Acme").await.unwrap();
        let older = Utc.with_ymd_and_hms(2024, 3, 1, 9, 15, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 3, 2, 18, 40, 12).unwrap();

        let first = session
            .create_scan_record(acme, "example.com", "", older, "0915")
            .await
            .unwrap();
        session
            .append_finding(first, &Finding::new("a", Severity::Low))
            .await
            .unwrap();

        let second = session
            .create_scan_record(acme, "example.com", "", newer, "1840")
            .await
            .unwrap();
        for finding in [
            Finding::new("b", Severity::Critical).with_cvss(9.8),
            Finding::new("c", Severity::High).with_cvss(7.0),
            Finding::new("d", Severity::Unrecognized("weird".into())),
        ] {
            session.append_finding(second, &finding).await.unwrap();
        }
        session
            .update_scan_record_status(second, ScanRecordStatus::Completed)
            .await
            .unwrap();

        session.upsert_company("Idle Co").await.unwrap();
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn company_overview() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        seed(&gateway).await;

        let companies = gateway.companies().await.unwrap();
        assert_eq!(companies.len(), 2);

        let acme = &companies[0];
        assert_eq!(acme.name, "Acme");
        assert_eq!(acme.total_scans, 2);
        assert_eq!(acme.last_scan.as_deref(), Some("2024-03-02 18:40:12"));
        assert_eq!(acme.vulnerabilities.critical, 1);
        assert_eq!(acme.vulnerabilities.low, 1);
        assert_eq!(acme.vulnerabilities.total(), 3);

        let idle = &companies[1];
        assert_eq!(idle.total_scans, 0);
        assert!(idle.last_scan.is_none());
    }

    #[tokio::test]
    async fn dates_times_and_report() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        seed(&gateway).await;

        let dates = gateway.scan_dates("Acme").await.unwrap().unwrap();
        assert_eq!(dates, vec!["20240302", "20240301"]);
        assert!(gateway.scan_dates("Nobody").await.unwrap().is_none());

        let times = gateway.scan_times("Acme", "20240302").await.unwrap().unwrap();
        assert_eq!(times, vec!["1840"]);
        assert!(gateway.scan_times("Acme", "2024-03-02").await.is_err());

        let report = gateway
            .scan_report("Acme", "20240302", "1840")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.status, "completed");
        assert_eq!(report.findings.len(), 3);
        assert_eq!(report.findings[0].template_name, "b");
        assert_eq!(report.statistics.critical, 1);
        assert_eq!(report.statistics.high, 1);
        assert_eq!(report.statistics.total(), 2);

        assert!(gateway
            .scan_report("Acme", "20240302", "0000")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn same_minute_scans_stay_apart() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        let mut session = gateway.open_session().await.unwrap();
        let acme = session.upsert_company("Acme").await.unwrap();
        let first_at = Utc.with_ymd_and_hms(2026, 10, 19, 1, 1, 5).unwrap();
        let second_at = Utc.with_ymd_and_hms(2026, 10, 19, 1, 1, 40).unwrap();

        let first = session
            .create_scan_record(acme, "a.example.com", "", first_at, "0101")
            .await
            .unwrap();
        session
            .append_finding(first, &Finding::new("from-first", Severity::Low))
            .await
            .unwrap();
        let second = session
            .create_scan_record(acme, "b.example.com", "", second_at, "0101-2")
            .await
            .unwrap();
        session
            .append_finding(second, &Finding::new("from-second", Severity::High))
            .await
            .unwrap();
        session.commit().await.unwrap();

        let times = gateway.scan_times("Acme", "20261019").await.unwrap().unwrap();
        assert_eq!(times, vec!["0101-2", "0101"]);

        let report = gateway
            .scan_report("Acme", "20261019", "0101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.target_domain, "a.example.com");
        assert_eq!(report.findings[0].template_name, "from-first");

        let report = gateway
            .scan_report("Acme", "20261019", "0101-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.target_domain, "b.example.com");
        assert_eq!(report.findings[0].template_name, "from-second");

        assert!(gateway.scan_report("Acme", "20261019", "0101-x").await.is_err());
    }

    #[tokio::test]
    async fn rows_without_run_time_fall_back_to_minute() {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        let mut session = gateway.open_session().await.unwrap();
        let acme = session.upsert_company("Acme").await.unwrap();
        session.commit().await.unwrap();
        sqlx::query(
            "INSERT INTO scans (company_id, target_domain, scan_datetime) \
             VALUES (?, 'example.com', '2023-07-04 12:34:56')",
        )
        .bind(acme)
        .execute(gateway.pool())
        .await
        .unwrap();

        let times = gateway.scan_times("Acme", "20230704").await.unwrap().unwrap();
        assert_eq!(times, vec!["1234"]);
        assert!(gateway
            .scan_report("Acme", "20230704", "1234")
            .await
            .unwrap()
            .is_some());
    }
}

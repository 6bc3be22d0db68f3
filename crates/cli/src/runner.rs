// runner.rs
use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use harrow_common::{JobState, ScanJob, Stage};
use harrow_orchestrator::ScanOrchestrator;
use harrow_storage::{ArtifactStore, SqliteGateway};
use harrow_tools::ProcessRunner;

use crate::args::OutputFormat;
use crate::config::AppConfig;
use crate::output::{print_companies, print_findings, print_list};

/// Run one scan to completion, printing progress changes to stderr.
pub async fn run_scan(
    cfg: AppConfig,
    company: String,
    target: String,
    format: OutputFormat,
    poll: Duration,
    metrics_addr: Option<SocketAddr>,
) -> Result<()> {
    if let Some(addr) = metrics_addr {
        harrow_telemetry::install_prometheus(addr)?;
    }

    let gateway = SqliteGateway::connect(&cfg.database_url).await?;
    let orchestrator = ScanOrchestrator::new(
        cfg.engine.clone(),
        Arc::new(ProcessRunner::new()),
        Arc::new(gateway),
        ArtifactStore::new(&cfg.artifacts_root),
    )
    .with_toolchain(cfg.tools.clone());

    info!(%company, %target, "requesting scan");
    let started = Instant::now();
    let job = orchestrator.request_scan(&company, &target).await?;
    eprintln!("Scan {} admitted", job.id);

    let mut last = (job.state, job.progress);
    let job = loop {
        tokio::time::sleep(poll).await;
        let job = orchestrator.query_status(job.id).await?;
        if (job.state, job.progress) != last {
            eprintln!("{}", describe(&job));
            last = (job.state, job.progress);
        }
        if job.is_terminal() {
            break job;
        }
    };

    if job.state == JobState::Failed {
        bail!(
            "scan {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        );
    }

    let Some(summary) = job.summary else {
        bail!("scan {} completed without a summary", job.id);
    };
    if !summary.persisted {
        warn!(
            artifact = %summary.result_artifact.display(),
            "findings were not stored in the database"
        );
    }

    let raw = tokio::fs::read_to_string(&summary.result_artifact)
        .await
        .with_context(|| format!("failed to read {}", summary.result_artifact.display()))?;
    let findings = harrow_normalizer::normalize(&raw);
    print_findings(&findings, &summary.statistics, format, Some(started.elapsed()))
}

pub async fn list_companies(cfg: &AppConfig, format: OutputFormat) -> Result<()> {
    let gateway = SqliteGateway::connect(&cfg.database_url).await?;
    print_companies(&gateway.companies().await?, format)
}

pub async fn list_dates(cfg: &AppConfig, company: &str) -> Result<()> {
    let gateway = SqliteGateway::connect(&cfg.database_url).await?;
    match gateway.scan_dates(company).await? {
        Some(dates) => {
            print_list(&dates);
            Ok(())
        }
        None => bail!("unknown company {company:?}"),
    }
}

pub async fn list_times(cfg: &AppConfig, company: &str, date: &str) -> Result<()> {
    let gateway = SqliteGateway::connect(&cfg.database_url).await?;
    match gateway.scan_times(company, date).await? {
        Some(times) => {
            print_list(&times);
            Ok(())
        }
        None => bail!("unknown company {company:?}"),
    }
}

pub async fn show_results(
    cfg: &AppConfig,
    company: &str,
    date: &str,
    time: &str,
    format: OutputFormat,
    from_artifacts: bool,
) -> Result<()> {
    if from_artifacts {
        let store = ArtifactStore::new(&cfg.artifacts_root);
        let Some(raw) = store.read_result(company, date, time).await? else {
            bail!("no result artifact for {company} at {date} {time}");
        };
        let (findings, stats) = harrow_normalizer::normalize_with_stats(&raw);
        return print_findings(&findings, &stats, format, None);
    }

    let gateway = SqliteGateway::connect(&cfg.database_url).await?;
    let Some(report) = gateway.scan_report(company, date, time).await? else {
        bail!("no scan for {company} at {date} {time}");
    };
    info!(scan_id = report.scan_id, status = %report.status, target = %report.target_domain, "scan found");
    print_findings(&report.findings, &report.statistics, format, None)
}

/// One progress line, e.g. `[ 40%] running (collection)`.
fn describe(job: &ScanJob) -> String {
    let stage = Stage::ALL
        .get(job.stage_index)
        .map_or("-", |stage| stage.name());
    match job.state {
        JobState::Running => format!("[{:>3}%] {} ({stage})", job.progress, job.state),
        JobState::Failed => format!(
            "[{:>3}%] {}: {}",
            job.progress,
            job.state,
            job.error.as_deref().unwrap_or("unknown error")
        ),
        _ => format!("[{:>3}%] {}", job.progress, job.state),
    }
}

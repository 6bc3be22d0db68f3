// crates/orchestrator/src/pipeline.rs
//! Pipeline executor - runs the four stages of one scan.
//!
//! The executor only holds job ids; every state change goes through
//! `JobRegistry::update`. Discovery and the vulnerability scan are fatal on
//! failure, collection tools fail softly, and persistence failures are
//! absorbed as long as findings were produced.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, instrument, warn};

use harrow_common::{
    CommandError, EngineConfig, Finding, Invocation, JobId, JobState, JobUpdate,
    PersistenceGateway, PersistenceSession, ScanError, ScanJob, ScanRecordStatus, ScanResult,
    ScanSummary, Stage, ToolRunner,
};
use harrow_storage::{ArtifactStore, ScanArtifacts};
use harrow_tools::Toolchain;

use crate::progress::{CollectionTally, ProgressPlan};
use crate::registry::JobRegistry;

#[derive(Clone)]
pub struct PipelineExecutor {
    registry: Arc<JobRegistry>,
    runner: Arc<dyn ToolRunner>,
    gateway: Arc<dyn PersistenceGateway>,
    artifacts: ArtifactStore,
    toolchain: Arc<Toolchain>,
    config: Arc<EngineConfig>,
    plan: ProgressPlan,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<dyn ToolRunner>,
        gateway: Arc<dyn PersistenceGateway>,
        artifacts: ArtifactStore,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            runner,
            gateway,
            artifacts,
            toolchain: Arc::new(Toolchain::default()),
            config,
            plan: ProgressPlan::default(),
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = Arc::new(toolchain);
        self
    }

    pub fn with_progress_plan(mut self, plan: ProgressPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Drive job `id` from queued to a terminal state and schedule its reaping.
    #[instrument(skip(self, id), fields(job_id = %id))]
    pub async fn run(&self, id: JobId) {
        let job = match self
            .registry
            .update(id, JobUpdate::Start { progress: self.plan.started })
            .await
        {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "job could not be started");
                return;
            }
        };
        info!(company = %job.company, target = %job.target, "scan started");

        let limit = self.config.scan_timeout();
        let outcome = match timeout(limit, self.execute(&job)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ScanError::Timeout(limit)),
        };

        let update = match outcome {
            Ok(summary) => {
                info!(
                    findings = summary.findings,
                    persisted = summary.persisted,
                    "scan completed"
                );
                JobUpdate::Complete(summary)
            }
            Err(e) => {
                error!(error = %e, "scan failed");
                JobUpdate::Fail(e.to_string())
            }
        };

        match self.registry.update(id, update).await {
            Ok(finished) => {
                harrow_telemetry::record_scan_finished(finished.state);
                let retention = match finished.state {
                    JobState::Completed => self.config.completed_retention(),
                    _ => self.config.failed_retention(),
                };
                self.registry.schedule_reap(id, retention);
            }
            Err(e) => warn!(error = %e, "final state not recorded"),
        }
    }

    async fn execute(&self, job: &ScanJob) -> ScanResult<ScanSummary> {
        let run = self
            .artifacts
            .prepare(&job.company, job.created_at)
            .await
            .map_err(|e| fatal(Stage::Discovery, format!("{e:#}")))?;

        self.discover(job, &run).await?;
        self.collect(job, &run).await?;
        let raw = self.scan(job, &run).await?;
        self.ingest(job, &run, &raw).await
    }

    async fn discover(&self, job: &ScanJob, run: &ScanArtifacts) -> ScanResult<()> {
        let started = Instant::now();
        let hosts = self
            .run_tool(self.toolchain.discovery(&job.target), self.config.stage_timeout())
            .await
            .map_err(|e| fatal(Stage::Discovery, e))?;

        run.write_hosts(&hosts)
            .await
            .map_err(|e| fatal(Stage::Discovery, format!("{e:#}")))?;
        run.seed_urls(&hosts)
            .await
            .map_err(|e| fatal(Stage::Discovery, format!("{e:#}")))?;
        debug!(hosts = hosts.lines().count(), "discovery finished");
        harrow_telemetry::record_stage_duration(Stage::Discovery, started.elapsed());

        self.advance(job.id, Stage::Discovery, self.plan.discovered).await
    }

    /// Fan out every collector at once; outputs land in completion order.
    async fn collect(&self, job: &ScanJob, run: &ScanArtifacts) -> ScanResult<()> {
        let started = Instant::now();
        let tools = self.toolchain.collection(&job.target);
        let total = tools.len();
        self.advance(job.id, Stage::Collection, self.plan.collection_start)
            .await?;

        let limit = self.config.collection_tool_timeout();
        let mut set = JoinSet::new();
        for invocation in tools {
            let runner = Arc::clone(&self.runner);
            set.spawn(async move {
                let output = bounded(runner.as_ref(), &invocation, limit).await;
                (invocation.label, output)
            });
        }

        let mut tally = CollectionTally::new(total);
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok((tool, Ok(urls))) => match run.append_urls(&urls).await {
                    Ok(()) => Ok(()),
                    Err(e) => Err(ScanError::StageSoft {
                        tool,
                        message: format!("{e:#}"),
                    }),
                },
                Ok((tool, Err(e))) => Err(ScanError::StageSoft {
                    tool,
                    message: e.to_string(),
                }),
                Err(e) => Err(ScanError::StageSoft {
                    tool: "collector".to_string(),
                    message: e.to_string(),
                }),
            };

            match outcome {
                Ok(()) => tally.record_success(),
                Err(e) => {
                    if let ScanError::StageSoft { tool, .. } = &e {
                        harrow_telemetry::record_collection_tool_failure(tool);
                    }
                    warn!(error = %e, "collection tool skipped");
                    tally.record_failure();
                }
            }
            self.advance(
                job.id,
                Stage::Collection,
                self.plan.collection_tool(tally.finished(), total),
            )
            .await?;
        }

        tally.log_summary();
        harrow_telemetry::record_stage_duration(Stage::Collection, started.elapsed());
        Ok(())
    }

    async fn scan(&self, job: &ScanJob, run: &ScanArtifacts) -> ScanResult<String> {
        let started = Instant::now();
        self.advance(job.id, Stage::VulnerabilityScan, self.plan.collection_done)
            .await?;

        let raw = self
            .run_tool(
                self.toolchain.vulnerability_scan(&run.urls),
                self.config.stage_timeout(),
            )
            .await
            .map_err(|e| fatal(Stage::VulnerabilityScan, e))?;
        run.write_result(&raw)
            .await
            .map_err(|e| fatal(Stage::VulnerabilityScan, format!("{e:#}")))?;
        harrow_telemetry::record_stage_duration(Stage::VulnerabilityScan, started.elapsed());

        self.advance(job.id, Stage::Ingestion, self.plan.scanned).await?;
        Ok(raw)
    }

    async fn ingest(&self, job: &ScanJob, run: &ScanArtifacts, raw: &str) -> ScanResult<ScanSummary> {
        let started = Instant::now();
        let (findings, statistics) = harrow_normalizer::normalize_with_stats(raw);
        harrow_telemetry::record_findings(findings.len());

        let persisted = match self.persist(job, run, &findings).await {
            Ok(stored) => {
                debug!(stored, "findings persisted");
                true
            }
            Err(e) if !findings.is_empty() => {
                warn!(
                    error = %format!("{e:#}"),
                    artifact = %run.result.display(),
                    "persistence failed; findings kept in artifact store"
                );
                false
            }
            Err(e) => return Err(ScanError::Persistence(format!("{e:#}"))),
        };
        harrow_telemetry::record_stage_duration(Stage::Ingestion, started.elapsed());

        Ok(ScanSummary {
            findings: findings.len(),
            statistics,
            result_artifact: run.result.clone(),
            persisted,
        })
    }

    /// One session per ingestion; rolled back on any setup or status error.
    async fn persist(
        &self,
        job: &ScanJob,
        run: &ScanArtifacts,
        findings: &[Finding],
    ) -> anyhow::Result<usize> {
        let mut session = self.gateway.open_session().await?;
        match write_records(&mut session, job, run, findings).await {
            Ok(stored) => {
                session.commit().await?;
                Ok(stored)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback().await {
                    warn!(error = %format!("{rollback:#}"), "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn run_tool(&self, invocation: Invocation, limit: Duration) -> Result<String, CommandError> {
        bounded(self.runner.as_ref(), &invocation, limit).await
    }

    async fn advance(&self, id: JobId, stage: Stage, progress: u8) -> ScanResult<()> {
        self.registry
            .update(id, JobUpdate::Advance { stage, progress })
            .await
            .map(|_| ())
    }
}

async fn write_records(
    session: &mut Box<dyn PersistenceSession>,
    job: &ScanJob,
    run: &ScanArtifacts,
    findings: &[Finding],
) -> anyhow::Result<usize> {
    let company_id = session.upsert_company(&job.company).await?;
    let scan_id = session
        .create_scan_record(
            company_id,
            &job.target,
            &run.urls.to_string_lossy(),
            job.created_at,
            &run.time,
        )
        .await?;
    session
        .update_scan_record_status(scan_id, ScanRecordStatus::Running)
        .await?;

    let mut stored = 0;
    for finding in findings {
        match session.append_finding(scan_id, finding).await {
            Ok(()) => stored += 1,
            Err(e) => warn!(
                template = %finding.template_name,
                error = %format!("{e:#}"),
                "finding not stored"
            ),
        }
    }

    session
        .update_scan_record_status(scan_id, ScanRecordStatus::Completed)
        .await?;
    Ok(stored)
}

/// Run with the runner's own limit, and enforce it here as well.
async fn bounded(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    limit: Duration,
) -> Result<String, CommandError> {
    match timeout(limit, runner.run(invocation, limit)).await {
        Ok(result) => result,
        Err(_) => Err(CommandError::TimedOut {
            program: invocation.label.clone(),
            after: limit,
        }),
    }
}

fn fatal(stage: Stage, cause: impl ToString) -> ScanError {
    ScanError::StageFatal {
        stage,
        message: cause.to_string(),
    }
}

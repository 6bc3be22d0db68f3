// crates/orchestrator/src/orchestrator.rs
//! Orchestrator - admission API over the registry and pipeline executor

use std::sync::Arc;
use tracing::{info, instrument};

use harrow_common::{
    EngineConfig, JobId, PersistenceGateway, ScanJob, ScanResult, ToolRunner,
};
use harrow_storage::ArtifactStore;
use harrow_target_resolver::TargetResolver;
use harrow_tools::Toolchain;

use crate::pipeline::PipelineExecutor;
use crate::progress::ProgressPlan;
use crate::registry::JobRegistry;

/// Admits scan requests and runs each admitted scan on its own task.
pub struct ScanOrchestrator {
    registry: Arc<JobRegistry>,
    executor: PipelineExecutor,
    config: Arc<EngineConfig>,
}

impl ScanOrchestrator {
    pub fn new(
        config: EngineConfig,
        runner: Arc<dyn ToolRunner>,
        gateway: Arc<dyn PersistenceGateway>,
        artifacts: ArtifactStore,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(JobRegistry::from_config(&config));
        let executor = PipelineExecutor::new(
            Arc::clone(&registry),
            runner,
            gateway,
            artifacts,
            Arc::clone(&config),
        );
        Self {
            registry,
            executor,
            config,
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.executor = self.executor.with_toolchain(toolchain);
        self
    }

    pub fn with_progress_plan(mut self, plan: ProgressPlan) -> Self {
        self.executor = self.executor.with_progress_plan(plan);
        self
    }

    /// Validate, admit and launch. Returns the queued job on admission.
    ///
    /// Invalid input is refused before admission is consulted, so it never
    /// starts a cooldown.
    #[instrument(skip(self))]
    pub async fn request_scan(&self, company: &str, target: &str) -> ScanResult<ScanJob> {
        let company = TargetResolver::validate_company(company)?;
        let target = TargetResolver::validate_domain(target)?;

        let job = match self.registry.admit(&company, &target).await {
            Ok(job) => job,
            Err(reason) => {
                harrow_telemetry::record_admission(reason.kind());
                info!(%company, %reason, "scan rejected");
                return Err(reason.into());
            }
        };
        harrow_telemetry::record_admission("admitted");
        info!(job_id = %job.id, %company, %target, "scan admitted");

        let executor = self.executor.clone();
        let id = job.id;
        tokio::spawn(async move { executor.run(id).await });
        Ok(job)
    }

    /// Current snapshot of a job, or `NotFound` once reaped.
    pub async fn query_status(&self, id: JobId) -> ScanResult<ScanJob> {
        self.registry.get(id).await
    }

    pub async fn snapshot(&self) -> Vec<ScanJob> {
        self.registry.snapshot().await
    }

    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryGateway, Script, ScriptedRunner, DISCOVERY, FINDINGS_JSONL, NUCLEI};
    use harrow_common::{JobState, RejectReason, ScanError};
    use std::time::Duration;
    use tempfile::TempDir;

    fn orchestrator(runner: ScriptedRunner, config: EngineConfig) -> (ScanOrchestrator, TempDir) {
        let root = tempfile::tempdir().unwrap();
        let orch = ScanOrchestrator::new(
            config,
            Arc::new(runner),
            Arc::new(MemoryGateway::new()),
            ArtifactStore::new(root.path()),
        );
        (orch, root)
    }

    fn runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .output(DISCOVERY, "https://a.example.com\n")
            .output(NUCLEI, FINDINGS_JSONL)
    }

    fn single_slot() -> EngineConfig {
        EngineConfig {
            max_concurrent_scans: 1,
            company_cooldown_secs: 0,
            ..EngineConfig::testing()
        }
    }

    /// Poll until the job is terminal, returning every progress value seen.
    async fn wait_terminal(orch: &ScanOrchestrator, id: JobId) -> (ScanJob, Vec<u8>) {
        let mut seen = Vec::new();
        for _ in 0..1000 {
            let job = orch.query_status(id).await.unwrap();
            seen.push(job.progress);
            if job.is_terminal() {
                return (job, seen);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn ceiling_scenario_end_to_end() {
        let (orch, _root) = orchestrator(runner(), single_slot());

        let first = orch.request_scan("Acme", "example.com").await.unwrap();
        assert_eq!(first.state, JobState::Queued);

        let err = orch.request_scan("Other", "example.org").await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::AdmissionRejected(RejectReason::ConcurrencyCeiling)
        ));
        assert!(err.to_string().ends_with("concurrency ceiling reached"));

        let (done, _) = wait_terminal(&orch, first.id).await;
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.progress, 100);

        let second = orch.request_scan("Other", "example.org").await.unwrap();
        assert_ne!(second.id, first.id);
        let (done, _) = wait_terminal(&orch, second.id).await;
        assert_eq!(done.state, JobState::Completed);
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let runner = runner().on("katana", Script::Hang(Duration::from_millis(50)));
        let (orch, _root) = orchestrator(runner, single_slot());

        let job = orch.request_scan("Acme", "example.com").await.unwrap();
        let (done, seen) = wait_terminal(&orch, job.id).await;
        assert_eq!(done.state, JobState::Completed);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[tokio::test]
    async fn cooldown_applies_per_company() {
        let config = EngineConfig {
            max_concurrent_scans: 5,
            company_cooldown_secs: 300,
            ..EngineConfig::testing()
        };
        let (orch, _root) = orchestrator(runner(), config);

        orch.request_scan("Acme", "example.com").await.unwrap();
        let err = orch.request_scan("Acme", "example.com").await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::AdmissionRejected(RejectReason::Cooldown { .. })
        ));
        assert!(orch.request_scan("Other", "example.com").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_admission() {
        let (orch, _root) = orchestrator(runner(), single_slot());

        let err = orch
            .request_scan("Acme", "example.com; rm -rf /")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidTarget(_)));
        let err = orch.request_scan("Acme/..", "example.com").await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidCompany(_)));

        assert_eq!(orch.active_count().await, 0);
        assert!(orch.snapshot().await.is_empty());
        assert!(orch.request_scan("Acme", "example.com").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let (orch, _root) = orchestrator(runner(), single_slot());
        let err = orch.query_status(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ScanError::NotFound(_)));
    }

    #[tokio::test]
    async fn target_is_normalized_before_launch() {
        let (orch, _root) = orchestrator(runner(), single_slot());
        let job = orch.request_scan("  Acme ", "Example.COM").await.unwrap();
        assert_eq!(job.company, "Acme");
        assert_eq!(job.target, "example.com");
    }
}

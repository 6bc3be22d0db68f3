//! Job registry - the one shared-mutable structure of the engine.
//!
//! Every read and write goes through a single async mutex that also guards
//! the admission controller, so admission and job creation cannot interleave
//! with another admission. Readers get cloned snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use harrow_common::{
    EngineConfig, JobId, JobUpdate, RejectReason, ScanError, ScanJob, ScanResult,
};

use crate::admission::AdmissionController;

struct Inner {
    jobs: HashMap<JobId, ScanJob>,
    admission: AdmissionController,
}

impl Inner {
    fn fresh_id(&self) -> JobId {
        loop {
            let id = Uuid::new_v4();
            if !self.jobs.contains_key(&id) {
                return id;
            }
        }
    }

    fn insert(&mut self, company: &str, target: &str) -> ScanJob {
        let job = ScanJob::with_id(self.fresh_id(), company, target);
        self.jobs.insert(job.id, job.clone());
        job
    }

    fn active(&self) -> impl Iterator<Item = &ScanJob> {
        self.jobs.values().filter(|job| job.state.is_active())
    }
}

pub struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    pub fn new(admission: AdmissionController) -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: HashMap::new(),
                admission,
            }),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(AdmissionController::from_config(config))
    }

    /// Admit and create in one critical section. The returned job is queued
    /// and already counts against the ceiling.
    pub async fn admit(&self, company: &str, target: &str) -> Result<ScanJob, RejectReason> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let active = inner.active().count();
        let company_active = inner.active().any(|job| job.company == company);

        inner.admission.prune(now);
        inner
            .admission
            .try_admit(company, active, company_active, now)?;
        Ok(inner.insert(company, target))
    }

    pub async fn get(&self, id: JobId) -> ScanResult<ScanJob> {
        self.inner
            .lock()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or(ScanError::NotFound(id))
    }

    /// Apply `update` atomically and return the resulting snapshot.
    pub async fn update(&self, id: JobId, update: JobUpdate) -> ScanResult<ScanJob> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(ScanError::NotFound(id))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    /// Remove a terminal job. Active jobs are never removed.
    pub async fn reap(&self, id: JobId) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.jobs.get(&id) {
            Some(job) if job.is_terminal() => {
                inner.jobs.remove(&id);
                debug!(job_id = %id, "job reaped");
                true
            }
            _ => false,
        }
    }

    /// Reap `id` once `after` has elapsed.
    pub fn schedule_reap(self: &Arc<Self>, id: JobId, after: Duration) -> JoinHandle<bool> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            registry.reap(id).await
        })
    }

    /// All jobs currently held, oldest first.
    pub async fn snapshot(&self) -> Vec<ScanJob> {
        let mut jobs: Vec<ScanJob> = self.inner.lock().await.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Queued plus running jobs.
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.active().count()
    }
}

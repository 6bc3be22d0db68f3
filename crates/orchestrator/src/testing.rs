//! Test doubles for the pipeline collaborators.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harrow_common::{
    CommandError, Finding, Invocation, PersistenceGateway, PersistenceSession, ScanRecordStatus,
    ToolRunner,
};

/// Label of the discovery chain built by `Toolchain::discovery`.
pub(crate) const DISCOVERY: &str = "subfinder|httpx";
pub(crate) const NUCLEI: &str = "nuclei";

pub(crate) const FINDINGS_JSONL: &str = concat!(
    r#"{"template-id":"xss-1","info":{"severity":"high"},"matched-at":"http://a.example.com/"}"#,
    "\n",
    r#"{"template-id":"cve-2021-1","info":{"severity":"critical","classification":{"cvss-score":9.8}}}"#,
    "\n",
);

#[derive(Clone)]
pub(crate) enum Script {
    Output(String),
    Fail(String),
    Hang(Duration),
}

/// Answers each invocation by label; unknown labels produce empty output.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    queued: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, label: &str, script: Script) -> Self {
        self.scripts.insert(label.to_string(), script);
        self
    }

    pub(crate) fn output(self, label: &str, out: &str) -> Self {
        self.on(label, Script::Output(out.to_string()))
    }

    /// Successive calls to `label` get `outputs` in order, then its script.
    pub(crate) fn outputs(self, label: &str, outputs: &[&str]) -> Self {
        self.queued.lock().unwrap().insert(
            label.to_string(),
            outputs.iter().map(|out| out.to_string()).collect(),
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation, _limit: Duration) -> Result<String, CommandError> {
        self.calls.lock().unwrap().push(invocation.label.clone());
        let next = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&invocation.label)
            .and_then(VecDeque::pop_front);
        if let Some(out) = next {
            return Ok(out);
        }
        match self.scripts.get(&invocation.label).cloned() {
            Some(Script::Output(out)) => Ok(out),
            Some(Script::Fail(stderr)) => Err(CommandError::Failed {
                program: invocation.label.clone(),
                code: Some(1),
                stderr,
            }),
            Some(Script::Hang(wait)) => {
                tokio::time::sleep(wait).await;
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredScan {
    pub company_id: i64,
    pub target: String,
    pub run_time: String,
    pub status: ScanRecordStatus,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    pub companies: Vec<String>,
    pub scans: Vec<StoredScan>,
    pub findings: Vec<(i64, Finding)>,
}

/// Gateway whose sessions stage writes and publish them on commit.
#[derive(Clone, Default)]
pub(crate) struct MemoryGateway {
    store: Arc<Mutex<MemoryStore>>,
    unavailable: bool,
}

impl MemoryGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every `open_session` fails.
    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub(crate) fn store(&self) -> MemoryStore {
        self.store.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn open_session(&self) -> Result<Box<dyn PersistenceSession>> {
        if self.unavailable {
            bail!("database unavailable");
        }
        let staged = self.store.lock().unwrap().clone();
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
            staged,
        }))
    }
}

struct MemorySession {
    store: Arc<Mutex<MemoryStore>>,
    staged: MemoryStore,
}

#[async_trait]
impl PersistenceSession for MemorySession {
    async fn upsert_company(&mut self, name: &str) -> Result<i64> {
        let companies = &mut self.staged.companies;
        let index = match companies.iter().position(|c| c == name) {
            Some(i) => i,
            None => {
                companies.push(name.to_string());
                companies.len() - 1
            }
        };
        Ok(index as i64 + 1)
    }

    async fn create_scan_record(
        &mut self,
        company_id: i64,
        target: &str,
        _domain_file: &str,
        _started_at: DateTime<Utc>,
        run_time: &str,
    ) -> Result<i64> {
        self.staged.scans.push(StoredScan {
            company_id,
            target: target.to_string(),
            run_time: run_time.to_string(),
            status: ScanRecordStatus::Initializing,
        });
        Ok(self.staged.scans.len() as i64)
    }

    async fn append_finding(&mut self, scan_id: i64, finding: &Finding) -> Result<()> {
        self.staged.findings.push((scan_id, finding.clone()));
        Ok(())
    }

    async fn update_scan_record_status(
        &mut self,
        scan_id: i64,
        status: ScanRecordStatus,
    ) -> Result<()> {
        let Some(scan) = usize::try_from(scan_id - 1)
            .ok()
            .and_then(|i| self.staged.scans.get_mut(i))
        else {
            bail!("scan record {scan_id} does not exist");
        };
        scan.status = status;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemorySession { store, staged } = *self;
        *store.lock().unwrap() = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

//! Admission control: a global ceiling on active scans plus a per-company
//! cooldown between successive starts.
//!
//! The controller itself holds no lock; `JobRegistry` owns it inside the same
//! mutex as the job map so a check and the matching insert are one step.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use harrow_common::{EngineConfig, RejectReason};

pub struct AdmissionController {
    ceiling: usize,
    cooldown: Duration,
    exclusive_per_company: bool,
    last_admitted: HashMap<String, Instant>,
}

impl AdmissionController {
    pub fn new(ceiling: usize, cooldown: Duration) -> Self {
        Self {
            ceiling,
            cooldown,
            exclusive_per_company: false,
            last_admitted: HashMap::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_concurrent_scans, config.company_cooldown())
            .with_exclusive_company_scans(config.exclusive_company_scans)
    }

    /// Refuse a company's scan while another one of its scans is active.
    pub fn with_exclusive_company_scans(mut self, exclusive: bool) -> Self {
        self.exclusive_per_company = exclusive;
        self
    }

    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Decide without recording anything.
    ///
    /// `active` counts queued and running jobs across all companies;
    /// `company_active` tells whether this company has one of them.
    pub fn check(
        &self,
        company: &str,
        active: usize,
        company_active: bool,
        now: Instant,
    ) -> Result<(), RejectReason> {
        if active >= self.ceiling {
            return Err(RejectReason::ConcurrencyCeiling);
        }
        if self.exclusive_per_company && company_active {
            return Err(RejectReason::CompanyBusy);
        }
        if let Some(remaining) = self.cooldown_remaining(company, now) {
            return Err(RejectReason::Cooldown { remaining });
        }
        Ok(())
    }

    /// Check and, on success, start the company's cooldown at `now`.
    pub fn try_admit(
        &mut self,
        company: &str,
        active: usize,
        company_active: bool,
        now: Instant,
    ) -> Result<(), RejectReason> {
        self.check(company, active, company_active, now)?;
        self.last_admitted.insert(company.to_string(), now);
        Ok(())
    }

    /// Time left before `company` may start again, if any.
    #[must_use]
    pub fn cooldown_remaining(&self, company: &str, now: Instant) -> Option<Duration> {
        let last = self.last_admitted.get(company)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.cooldown).then(|| self.cooldown - elapsed)
    }

    /// Forget companies whose cooldown has expired.
    pub fn prune(&mut self, now: Instant) {
        let cooldown = self.cooldown;
        self.last_admitted
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
    }
}

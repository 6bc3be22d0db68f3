//! Progress weights and collection bookkeeping

use tracing::info;

/// Percentages reported at each pipeline checkpoint.
///
/// Values must be non-decreasing in declaration order and below 100; the
/// registry clamps anything lower than the current value anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPlan {
    pub started: u8,
    pub discovered: u8,
    pub collection_start: u8,
    pub collection_done: u8,
    pub scanned: u8,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            started: 10,
            discovered: 20,
            collection_start: 40,
            collection_done: 80,
            scanned: 90,
        }
    }
}

impl ProgressPlan {
    /// Progress after `finished` of `total` collection tools returned.
    #[must_use]
    pub fn collection_tool(&self, finished: usize, total: usize) -> u8 {
        if total == 0 {
            return self.collection_done;
        }
        let span = usize::from(self.collection_done.saturating_sub(self.collection_start));
        let step = span * finished.min(total) / total;
        self.collection_start
            .saturating_add(u8::try_from(step).unwrap_or(u8::MAX))
            .min(self.collection_done)
    }
}

/// Outcome counts of one collection fan-out.
#[derive(Debug, Default)]
pub struct CollectionTally {
    total: usize,
    succeeded: usize,
    failed: usize,
}

impl CollectionTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    #[inline]
    #[must_use]
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    #[inline]
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total,
            succeeded = self.succeeded,
            failed = self.failed,
            "collection finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_are_ordered() {
        let plan = ProgressPlan::default();
        let seq = [
            plan.started,
            plan.discovered,
            plan.collection_start,
            plan.collection_done,
            plan.scanned,
        ];
        assert!(seq.windows(2).all(|w| w[0] <= w[1]));
        assert!(plan.scanned < 100);
    }

    #[test]
    fn collection_progress_spreads_over_tools() {
        let plan = ProgressPlan::default();
        assert_eq!(plan.collection_tool(0, 4), 40);
        assert_eq!(plan.collection_tool(1, 4), 50);
        assert_eq!(plan.collection_tool(2, 4), 60);
        assert_eq!(plan.collection_tool(4, 4), 80);
        assert_eq!(plan.collection_tool(9, 4), 80);
        assert_eq!(plan.collection_tool(0, 0), 80);
    }

    #[test]
    fn tally_counts() {
        let mut tally = CollectionTally::new(3);
        tally.record_success();
        tally.record_failure();
        assert_eq!(tally.finished(), 2);
        assert_eq!(tally.failed(), 1);
        tally.log_summary();
    }
}

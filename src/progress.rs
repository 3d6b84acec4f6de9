//! Observer hook for long-running fetch loops.

use crate::change::ChangeRecord;

/// Receives progress events from a run. Implementations must not affect results.
pub trait Progress: Send + Sync {
    fn deployments_listed(&self, _count: usize) {}
    fn deployment_scanned(&self, _deployment_number: u64, _changes_found: usize) {}
    fn change_resolved(&self, _record: &ChangeRecord) {}
    fn ci_sampled(&self, _branch: &str, _median_seconds: u64) {}
}

/// Discards every event.
pub struct NoProgress;

impl Progress for NoProgress {}

/// Reports progress as `tracing` events.
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn deployments_listed(&self, count: usize) {
        tracing::info!(count, "Listed deployment PRs");
    }

    fn deployment_scanned(&self, deployment_number: u64, changes_found: usize) {
        tracing::debug!(deployment_number, changes_found, "Scanned deployment PR");
    }

    fn change_resolved(&self, record: &ChangeRecord) {
        tracing::debug!(
            pr_number = record.pr_number,
            lead_time_seconds = record.lead_time_seconds(),
            "Resolved change"
        );
    }

    fn ci_sampled(&self, branch: &str, median_seconds: u64) {
        tracing::info!(branch, median_seconds, "Sampled CI duration");
    }
}

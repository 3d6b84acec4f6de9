//! One delivered change, correlated across its staging and trunk merges.
//!
//! A change is built in two stages. The correlator produces a
//! [`CorrelatedChange`] holding identity and both merge timestamps; the resolver
//! turns it into a [`ChangeRecord`] once the first commit of the originating PR
//! is known. Both stages are immutable.

use crate::error::{MetricsError, MetricsResult};
use crate::source::Commit;
use crate::time::duration_to_days;
use chrono::{DateTime, Duration, Utc};

/// Stage one: a sub-PR reference found on a deployment PR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelatedChange {
    pub pr_number: u64,
    pub title: String,
    pub merged_into_staging_at: DateTime<Utc>,
    pub merged_into_master_at: DateTime<Utc>,
    /// The deployment PR whose commit list carried the reference.
    pub deployment_number: u64,
}

impl CorrelatedChange {
    /// Completes the record with the originating PR's first commit.
    ///
    /// Fails if the timeline is out of order: the first commit must not come
    /// after the staging merge, and the staging merge must not come after the
    /// trunk merge.
    pub fn resolve(self, first_commit: &Commit) -> MetricsResult<ChangeRecord> {
        let first_commit_at = first_commit.committed_at;

        if first_commit_at > self.merged_into_staging_at {
            return Err(MetricsError::correlation(
                self.pr_number,
                format!(
                    "first commit {} is after staging merge {}",
                    first_commit_at, self.merged_into_staging_at
                ),
            ));
        }
        if self.merged_into_staging_at > self.merged_into_master_at {
            return Err(MetricsError::correlation(
                self.pr_number,
                format!(
                    "staging merge {} is after master merge {} (deployment #{})",
                    self.merged_into_staging_at, self.merged_into_master_at, self.deployment_number
                ),
            ));
        }

        Ok(ChangeRecord {
            staging_wait: self.merged_into_staging_at - first_commit_at,
            promotion_wait: self.merged_into_master_at - self.merged_into_staging_at,
            pr_number: self.pr_number,
            title: self.title,
            first_commit_at,
            merged_into_staging_at: self.merged_into_staging_at,
            merged_into_master_at: self.merged_into_master_at,
            first_commit_author: first_commit.author_name.clone(),
            deployment_number: self.deployment_number,
        })
    }
}

/// Stage two: a change with its full timeline and lead time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub pr_number: u64,
    pub title: String,
    pub first_commit_at: DateTime<Utc>,
    pub merged_into_staging_at: DateTime<Utc>,
    pub merged_into_master_at: DateTime<Utc>,
    pub first_commit_author: String,
    pub deployment_number: u64,
    /// First commit to staging merge.
    staging_wait: Duration,
    /// Staging merge to trunk merge.
    promotion_wait: Duration,
}

impl ChangeRecord {
    pub fn staging_wait(&self) -> Duration {
        self.staging_wait
    }

    pub fn promotion_wait(&self) -> Duration {
        self.promotion_wait
    }

    /// Sum of both stages; equal to `merged_into_master_at - first_commit_at`.
    pub fn lead_time(&self) -> Duration {
        self.staging_wait + self.promotion_wait
    }

    pub fn lead_time_seconds(&self) -> i64 {
        self.lead_time().num_seconds()
    }

    pub fn lead_time_days(&self) -> f64 {
        duration_to_days(self.lead_time())
    }
}

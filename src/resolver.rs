//! Completes correlated changes with the originating PR's first commit.

use crate::change::{ChangeRecord, CorrelatedChange};
use crate::error::{MetricsError, MetricsResult};
use crate::progress::Progress;
use crate::source::{Commit, CommitSource};
use futures::stream::{self, StreamExt, TryStreamExt};

pub struct LeadTimeResolver {
    concurrency: usize,
}

impl LeadTimeResolver {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Resolves one change. An originating PR with no commits is a
    /// correlation error.
    pub async fn resolve<S>(&self, change: CorrelatedChange, source: &S) -> MetricsResult<ChangeRecord>
    where
        S: CommitSource + ?Sized,
    {
        let commits = source.pull_request_commits(change.pr_number).await?;
        let first = first_commit(&commits).ok_or_else(|| {
            MetricsError::correlation(change.pr_number, "pull request has no commits")
        })?;
        change.resolve(first)
    }

    /// Resolves every change, keeping input order. Stops at the first error.
    pub async fn resolve_all<S>(
        &self,
        changes: Vec<CorrelatedChange>,
        source: &S,
        progress: &dyn Progress,
    ) -> MetricsResult<Vec<ChangeRecord>>
    where
        S: CommitSource + ?Sized,
    {
        stream::iter(changes)
            .map(|change| async move {
                let record = self.resolve(change, source).await?;
                progress.change_resolved(&record);
                Ok::<_, MetricsError>(record)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

/// Earliest commit by committer date; the first listed wins on ties.
fn first_commit(commits: &[Commit]) -> Option<&Commit> {
    commits.iter().reduce(|earliest, commit| {
        if commit.committed_at < earliest.committed_at {
            commit
        } else {
            earliest
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
    }

    fn commit(sha: &str, author: &str, committed_at: DateTime<Utc>) -> Commit {
        Commit {
            sha: sha.to_string(),
            message: "work".to_string(),
            committed_at,
            author_name: author.to_string(),
        }
    }

    fn change(pr_number: u64) -> CorrelatedChange {
        CorrelatedChange {
            pr_number,
            title: "feature".to_string(),
            merged_into_staging_at: t0() + Duration::days(2),
            merged_into_master_at: t0() + Duration::days(4),
            deployment_number: 900,
        }
    }

    struct FixedCommits(HashMap<u64, Vec<Commit>>);

    #[async_trait]
    impl CommitSource for FixedCommits {
        async fn pull_request_commits(&self, number: u64) -> MetricsResult<Vec<Commit>> {
            Ok(self.0.get(&number).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn test_first_commit_is_chronological() {
        let commits = vec![
            commit("b", "bob", t0() + Duration::hours(2)),
            commit("a", "alice", t0()),
            commit("c", "carol", t0()),
        ];
        assert_eq!(first_commit(&commits).unwrap().sha, "a");
        assert!(first_commit(&[]).is_none());
    }

    #[tokio::test]
    async fn test_resolve_sets_first_commit_and_lead_time() {
        let source = FixedCommits(HashMap::from([(
            42,
            vec![
                commit("a", "alice", t0()),
                commit("b", "bob", t0() + Duration::days(1)),
            ],
        )]));

        let record = LeadTimeResolver::new(2).resolve(change(42), &source).await.unwrap();

        assert_eq!(record.first_commit_at, t0());
        assert_eq!(record.first_commit_author, "alice");
        assert_eq!(record.lead_time(), Duration::days(4));
        assert_eq!(record.staging_wait(), Duration::days(2));
        assert_eq!(record.promotion_wait(), Duration::days(2));
    }

    #[tokio::test]
    async fn test_resolve_fails_on_empty_commit_list() {
        let source = FixedCommits(HashMap::new());
        let err = LeadTimeResolver::new(2).resolve(change(7), &source).await.unwrap_err();
        assert!(matches!(err, MetricsError::Correlation { pr_number: 7, .. }));
    }

    #[tokio::test]
    async fn test_resolve_all_aborts_on_first_failure() {
        let source = FixedCommits(HashMap::from([(1, vec![commit("a", "alice", t0())])]));
        let result = LeadTimeResolver::new(1)
            .resolve_all(vec![change(1), change(2)], &source, &NoProgress)
            .await;
        assert!(matches!(result, Err(MetricsError::Correlation { pr_number: 2, .. })));
    }

    #[tokio::test]
    async fn test_resolve_all_keeps_order() {
        let source = FixedCommits(HashMap::from([
            (1, vec![commit("a", "alice", t0())]),
            (2, vec![commit("b", "bob", t0() + Duration::days(1))]),
        ]));
        let records = LeadTimeResolver::new(4)
            .resolve_all(vec![change(2), change(1)], &source, &NoProgress)
            .await
            .unwrap();
        let numbers: Vec<u64> = records.iter().map(|r| r.pr_number).collect();
        assert_eq!(numbers, vec![2, 1]);
    }
}

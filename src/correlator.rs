//! Recovers the sub-PRs carried by each deployment PR.
//!
//! A deployment PR (staging → trunk) lists, among its commits, the merge commits
//! that brought feature PRs into staging. Each such commit names the feature PR
//! in its message; that reference, the commit's committer date and the
//! deployment's merge date make up one [`CorrelatedChange`].

use crate::bots::BotFilter;
use crate::change::CorrelatedChange;
use crate::error::{MetricsError, MetricsResult};
use crate::progress::Progress;
use crate::source::{Commit, CommitSource, DeploymentPr};
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static MERGE_PULL_REQUEST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Merge pull request #(\d+)").expect("Invalid merge pull request regex")
});

static SQUASH_MERGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)\s*$").expect("Invalid squash merge regex"));

/// The message formats a PR-carrying commit can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitShape {
    /// GitHub merge commit: `Merge pull request #42 from org/branch`.
    MergePullRequest,
    /// Squash merge: first line ends in `(#42)`.
    SquashMerge,
}

impl CommitShape {
    fn extract(self, message: &str) -> Option<u64> {
        let captures = match self {
            Self::MergePullRequest => MERGE_PULL_REQUEST_REGEX.captures(message)?,
            Self::SquashMerge => SQUASH_MERGE_REGEX.captures(message.lines().next()?)?,
        };
        captures.get(1)?.as_str().parse().ok()
    }
}

/// A PR number recovered from a commit message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrReference {
    pub number: u64,
    pub shape: CommitShape,
}

/// Tries each shape in order and returns the first match.
#[derive(Clone, Debug)]
pub struct CommitMatcher {
    shapes: Vec<CommitShape>,
}

impl Default for CommitMatcher {
    fn default() -> Self {
        Self {
            shapes: vec![CommitShape::MergePullRequest],
        }
    }
}

impl CommitMatcher {
    pub fn new(shapes: Vec<CommitShape>) -> Self {
        Self { shapes }
    }

    pub fn match_message(&self, message: &str) -> Option<PrReference> {
        self.shapes.iter().find_map(|&shape| {
            shape
                .extract(message)
                .map(|number| PrReference { number, shape })
        })
    }
}

pub struct Correlator {
    matcher: CommitMatcher,
    bots: BotFilter,
    concurrency: usize,
}

impl Correlator {
    pub fn new(matcher: CommitMatcher, bots: BotFilter, concurrency: usize) -> Self {
        Self {
            matcher,
            bots,
            concurrency: concurrency.max(1),
        }
    }

    /// Extracts the changes carried by one deployment PR's commits.
    ///
    /// Commits whose message mentions a bot are skipped even if they also hold
    /// a PR reference. Commits without a reference are dropped.
    pub fn changes_from_commits(
        &self,
        deployment: &DeploymentPr,
        commits: &[Commit],
    ) -> Vec<CorrelatedChange> {
        commits
            .iter()
            .filter(|commit| !self.bots.is_bot(&commit.message))
            .filter_map(|commit| {
                let reference = self.matcher.match_message(&commit.message)?;
                Some(CorrelatedChange {
                    pr_number: reference.number,
                    title: title_of(&commit.message).to_string(),
                    merged_into_staging_at: commit.committed_at,
                    merged_into_master_at: deployment.merged_at,
                    deployment_number: deployment.number,
                })
            })
            .collect()
    }

    /// Fetches every deployment's commits and correlates them.
    ///
    /// Output follows deployment order, then commit order. A PR referenced by
    /// more than one deployment is kept once, with its earliest trunk merge.
    pub async fn correlate<S>(
        &self,
        deployments: &[DeploymentPr],
        source: &S,
        progress: &dyn Progress,
    ) -> MetricsResult<Vec<CorrelatedChange>>
    where
        S: CommitSource + ?Sized,
    {
        let per_deployment: Vec<Vec<CorrelatedChange>> = stream::iter(deployments)
            .map(|deployment| async move {
                let commits = source.pull_request_commits(deployment.number).await?;
                let changes = self.changes_from_commits(deployment, &commits);
                progress.deployment_scanned(deployment.number, changes.len());
                Ok::<_, MetricsError>(changes)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(dedup_by_pr_number(per_deployment.into_iter().flatten()))
    }
}

/// Last non-blank line of a commit message.
fn title_of(message: &str) -> &str {
    message
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .unwrap_or_default()
}

fn dedup_by_pr_number(changes: impl IntoIterator<Item = CorrelatedChange>) -> Vec<CorrelatedChange> {
    let mut unique: Vec<CorrelatedChange> = Vec::new();
    let mut positions: HashMap<u64, usize> = HashMap::new();

    for change in changes {
        match positions.get(&change.pr_number) {
            Some(&idx) => {
                tracing::debug!(
                    pr_number = change.pr_number,
                    first_deployment = unique[idx].deployment_number,
                    duplicate_deployment = change.deployment_number,
                    "PR referenced by more than one deployment"
                );
                if change.merged_into_master_at < unique[idx].merged_into_master_at {
                    unique[idx] = change;
                }
            }
            None => {
                positions.insert(change.pr_number, unique.len());
                unique.push(change);
            }
        }
    }

    unique
}

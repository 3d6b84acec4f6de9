//! Collaborator seams: what the core needs from version control and CI.
//!
//! The types here are deliberately wire-neutral so the correlator and resolver
//! can be driven by GitHub, by a fixture, or by anything else that speaks
//! these traits.

use crate::error::MetricsResult;
use crate::time::DeploymentWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pull request merged into the trunk branch; one deployment event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPr {
    pub number: u64,
    pub merged_at: DateTime<Utc>,
}

/// One commit as listed on a pull request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub committed_at: DateTime<Utc>,
    /// Display name of the commit author; bot detection runs on this.
    pub author_name: String,
}

/// Lists the deployment PRs merged inside a window.
#[async_trait]
pub trait DeploymentSource: Send + Sync {
    async fn merged_deployments(
        &self,
        trunk_branch: &str,
        window: &DeploymentWindow,
    ) -> MetricsResult<Vec<DeploymentPr>>;
}

/// Lists the commits of a pull request, in API (chronological) order.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn pull_request_commits(&self, number: u64) -> MetricsResult<Vec<Commit>>;
}

/// Median workflow duration for a branch over the trailing reporting window.
#[async_trait]
pub trait CiInsights: Send + Sync {
    /// `Ok(None)` when the branch has no workflow runs in the window.
    async fn median_duration_seconds(&self, branch: &str) -> MetricsResult<Option<u64>>;
}

//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which names the repository to measure, the credentials
//! for GitHub and CircleCI, the reporting window, and the knobs for the fetch loops.

use crate::bots::DEFAULT_BOT_MARKERS;
use crate::error::{MetricsError, MetricsResult};
use crate::time::{DeploymentWindow, DEFAULT_WINDOW_DAYS};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = MetricsError;

    /// Parses `owner/repo`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').map(str::trim).collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(RepoId {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(MetricsError::Config {
                message: format!("expected repository as owner/name, got '{s}'"),
            }),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Repository to measure, as "owner/name".
    #[serde(deserialize_with = "deserialize_repo_id")]
    pub repo: RepoId,

    /// GitHub personal access token.
    pub access_token: Option<String>,

    /// CircleCI personal API token.
    pub circle_ci_personal_api_token: Option<String>,

    /// First day of the reporting window. Defaults to 14 days before today.
    pub from: Option<NaiveDate>,

    /// Last day of the reporting window. Defaults to today.
    pub to: Option<NaiveDate>,

    /// Production branch; PRs merged into it count as deployments.
    #[serde(default = "default_trunk_branch")]
    pub trunk_branch: String,

    /// Intermediate branch feature PRs are merged into first.
    #[serde(default = "default_staging_branch")]
    pub staging_branch: String,

    /// Substrings identifying automated authors.
    /// Expected format: comma-separated string, e.g. "dependabot,renovate".
    #[serde(
        default = "default_bot_markers",
        deserialize_with = "deserialize_bot_markers"
    )]
    pub bot_markers: Vec<String>,

    /// Maximum number of concurrent commit-list requests.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Timeout for a single remote call, in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Retries for rate-limited or transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Directory the CSV table is written to.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    #[serde(default = "default_circleci_base_url")]
    pub circleci_base_url: String,

    /// Project slug prefix on CircleCI ("gh" for GitHub, "bb" for Bitbucket).
    #[serde(default = "default_circleci_vcs_slug")]
    pub circleci_vcs_slug: String,

    /// GitHub API base for Enterprise installations.
    pub github_base_url: Option<String>,
}

fn default_trunk_branch() -> String {
    "master".to_string()
}

fn default_staging_branch() -> String {
    "staging".to_string()
}

fn default_bot_markers() -> Vec<String> {
    DEFAULT_BOT_MARKERS.iter().map(|m| m.to_string()).collect()
}

fn default_fetch_concurrency() -> usize {
    8
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_artifacts_dir() -> String {
    "artifacts".to_string()
}

fn default_circleci_base_url() -> String {
    "https://circleci.com/api/v2".to_string()
}

fn default_circleci_vcs_slug() -> String {
    "gh".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Minimal configuration for `repo` with every optional setting at its default.
    pub fn for_repo(repo: RepoId) -> Self {
        Self {
            repo,
            access_token: None,
            circle_ci_personal_api_token: None,
            from: None,
            to: None,
            trunk_branch: default_trunk_branch(),
            staging_branch: default_staging_branch(),
            bot_markers: default_bot_markers(),
            fetch_concurrency: default_fetch_concurrency(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_retries: default_max_retries(),
            artifacts_dir: default_artifacts_dir(),
            circleci_base_url: default_circleci_base_url(),
            circleci_vcs_slug: default_circleci_vcs_slug(),
            github_base_url: None,
        }
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_seconds)
    }

    /// The reporting window, with missing bounds filled in relative to `today`.
    pub fn window(&self, today: NaiveDate) -> MetricsResult<DeploymentWindow> {
        let from = self
            .from
            .unwrap_or_else(|| today - Duration::days(DEFAULT_WINDOW_DAYS));
        let to = self.to.unwrap_or(today);
        DeploymentWindow::new(from, to).ok_or_else(|| MetricsError::Config {
            message: format!("FROM ({from}) is after TO ({to})"),
        })
    }
}

fn deserialize_repo_id<'de, D>(deserializer: D) -> Result<RepoId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

fn deserialize_bot_markers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_bot_markers(&s))
}

fn parse_bot_markers(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

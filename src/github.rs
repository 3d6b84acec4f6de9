//! GitHub collaborator: deployment search and PR commit listing via octocrab.
//!
//! Pages are fetched with octocrab's raw `_get` so the status and the
//! rate-limit headers are seen before the body is decoded. Octocrab's own
//! retry layer is disabled; `RetryPolicy` is the only one.

use crate::config::{AppConfig, RepoId};
use crate::error::{MetricsError, MetricsResult};
use crate::retry::{retry_after_hint, RetryPolicy};
use crate::source::{Commit, CommitSource, DeploymentPr, DeploymentSource};
use crate::time::DeploymentWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::{FromResponse, Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const PER_PAGE: &str = "100";

/// Anchor for encoding relative routes; only path and query are sent.
const ENCODING_BASE: &str = "https://api.github.com";

/// An item of the issue search; only the fields the report needs.
#[derive(Debug, Deserialize)]
struct SearchIssue {
    number: u64,
    closed_at: Option<DateTime<Utc>>,
    pull_request: Option<IssuePullRequest>,
}

#[derive(Debug, Deserialize)]
struct IssuePullRequest {
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PullRequestCommit {
    sha: String,
    commit: CommitDetail,
    author: Option<GitHubUser>,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<GitActor>,
    committer: Option<GitActor>,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

impl SearchIssue {
    fn into_deployment(self) -> MetricsResult<DeploymentPr> {
        let merged_at = self
            .pull_request
            .and_then(|pr| pr.merged_at)
            .or(self.closed_at)
            .ok_or_else(|| MetricsError::correlation(self.number, "deployment PR has no merge timestamp"))?;

        Ok(DeploymentPr {
            number: self.number,
            merged_at,
        })
    }
}

impl PullRequestCommit {
    fn into_commit(self) -> MetricsResult<Commit> {
        let CommitDetail {
            message,
            author,
            committer,
        } = self.commit;

        let committed_at = committer
            .as_ref()
            .and_then(|c| c.date)
            .or_else(|| author.as_ref().and_then(|a| a.date))
            .ok_or_else(|| MetricsError::InvalidResponse {
                message: format!("commit {} has no committer date", self.sha),
            })?;

        let author_name = author
            .and_then(|a| a.name)
            .or_else(|| self.author.map(|user| user.login))
            .unwrap_or_default();

        Ok(Commit {
            sha: self.sha,
            message,
            committed_at,
            author_name,
        })
    }
}

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    repo: RepoId,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(config: &AppConfig) -> MetricsResult<Self> {
        let mut builder = Octocrab::builder().add_retry_config(RetryConfig::None);
        if let Some(token) = &config.access_token {
            builder = builder.personal_token(token.clone());
        }
        if let Some(base_url) = &config.github_base_url {
            builder = builder
                .base_uri(base_url.as_str())
                .map_err(|e| MetricsError::Config {
                    message: format!("invalid GITHUB_BASE_URL '{base_url}': {e}"),
                })?;
        }

        Ok(Self {
            octocrab: builder.build()?,
            repo: config.repo.clone(),
            retry: RetryPolicy::new(config.max_retries, config.request_timeout()),
        })
    }

    /// Search query for PRs merged into `trunk_branch` inside `window`.
    pub fn deployment_query(&self, trunk_branch: &str, window: &DeploymentWindow) -> String {
        format!(
            "repo:{} is:pr is:merged base:{} merged:{}",
            self.repo,
            trunk_branch,
            window.search_range()
        )
    }

    async fn search_all(&self, query: &str) -> MetricsResult<Vec<SearchIssue>> {
        let uri = path_and_query("/search/issues", &[("q", query), ("per_page", PER_PAGE)])?;
        self.get_all(uri).await
    }

    async fn commits_all(&self, number: u64) -> MetricsResult<Vec<PullRequestCommit>> {
        let route = format!(
            "/repos/{}/{}/pulls/{}/commits",
            self.repo.owner, self.repo.repo, number
        );
        let uri = path_and_query(&route, &[("per_page", PER_PAGE)])?;
        self.get_all(uri).await
    }

    async fn get_all<T: DeserializeOwned + Send>(&self, uri: String) -> MetricsResult<Vec<T>> {
        let mut page: Page<T> = self.get_page(uri).await?;
        let mut items = page.take_items();

        while let Some(next) = next_page(&page) {
            page = self.get_page(next).await?;
            items.append(&mut page.take_items());
        }
        Ok(items)
    }

    /// The only place that interprets GitHub status codes.
    async fn get_page<T: DeserializeOwned + Send>(&self, uri: String) -> MetricsResult<Page<T>> {
        let response = self.octocrab._get(uri).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Page::<T>::from_response(response).await?);
        }

        let hint = retry_after_hint(response.headers());
        match status.as_u16() {
            429 => Err(MetricsError::RateLimited { retry_after: hint }),

            // Secondary limits carry Retry-After; an exhausted quota carries a reset.
            403 if hint.is_some() => Err(MetricsError::RateLimited { retry_after: hint }),

            500..=599 => Err(MetricsError::Network {
                message: format!("GitHub server error: {status}"),
            }),

            _ => Err(match octocrab::map_github_error(response).await {
                Err(err) => with_hint(MetricsError::from(err), hint),
                Ok(_) => MetricsError::InvalidResponse {
                    message: format!("unexpected GitHub status: {status}"),
                },
            }),
        }
    }
}

/// Form-encodes `params` onto `route`, keeping the result relative so octocrab
/// applies its base URI and credentials.
fn path_and_query(route: &str, params: &[(&str, &str)]) -> MetricsResult<String> {
    let mut url = reqwest::Url::parse(ENCODING_BASE)
        .and_then(|base| base.join(route))
        .map_err(|e| MetricsError::Config {
            message: format!("invalid GitHub route '{route}': {e}"),
        })?;
    url.query_pairs_mut().extend_pairs(params);

    Ok(match url.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", url.path(), query),
        _ => url.path().to_string(),
    })
}

fn next_page<T>(page: &Page<T>) -> Option<String> {
    let next = page.next.as_ref()?;
    next.path_and_query().map(|pq| pq.as_str().to_string())
}

fn with_hint(err: MetricsError, hint: Option<Duration>) -> MetricsError {
    match err {
        MetricsError::RateLimited { retry_after: None } => {
            MetricsError::RateLimited { retry_after: hint }
        }
        other => other,
    }
}

#[async_trait]
impl DeploymentSource for GitHubClient {
    async fn merged_deployments(
        &self,
        trunk_branch: &str,
        window: &DeploymentWindow,
    ) -> MetricsResult<Vec<DeploymentPr>> {
        let query = self.deployment_query(trunk_branch, window);
        tracing::info!(repo_id = %self.repo, query = %query, "Searching deployment PRs");

        let query = query.as_str();
        let issues = self
            .retry
            .run("search deployment PRs", move || self.search_all(query))
            .await?;

        issues.into_iter().map(SearchIssue::into_deployment).collect()
    }
}

#[async_trait]
impl CommitSource for GitHubClient {
    async fn pull_request_commits(&self, number: u64) -> MetricsResult<Vec<Commit>> {
        let operation = format!("list commits of PR #{number}");
        let commits = self
            .retry
            .run(&operation, move || self.commits_all(number))
            .await?;

        commits.into_iter().map(PullRequestCommit::into_commit).collect()
    }
}

//! CircleCI Insights client and per-branch duration sampling.
//!
//! This is the only place that interprets CircleCI status codes. The sampler
//! above it only sees `Option<u64>` medians.

use crate::config::{AppConfig, RepoId};
use crate::error::{MetricsError, MetricsResult};
use crate::metrics::CiSamples;
use crate::retry::{retry_after_hint, RetryPolicy};
use crate::source::CiInsights;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// Trailing window the insights endpoint aggregates over.
pub const REPORTING_WINDOW: &str = "last-90-days";

const TOKEN_HEADER: &str = "Circle-Token";

#[derive(Debug, Deserialize)]
struct WorkflowInsights {
    #[serde(default)]
    items: Vec<WorkflowSummary>,
}

#[derive(Debug, Deserialize)]
struct WorkflowSummary {
    name: String,
    metrics: WorkflowMetrics,
}

#[derive(Debug, Deserialize)]
struct WorkflowMetrics {
    duration_metrics: DurationMetrics,
}

#[derive(Debug, Deserialize)]
struct DurationMetrics {
    median: u64,
}

#[derive(Debug, Clone)]
pub struct CircleCiClient {
    client: reqwest::Client,
    base_url: String,
    project_slug: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl CircleCiClient {
    pub fn new(config: &AppConfig) -> MetricsResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dora-report/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.circleci_base_url.trim_end_matches('/').to_string(),
            project_slug: project_slug(&config.circleci_vcs_slug, &config.repo),
            token: config.circle_ci_personal_api_token.clone(),
            retry: RetryPolicy::new(config.max_retries, config.request_timeout()),
        })
    }

    fn workflows_url(&self) -> String {
        format!("{}/insights/{}/workflows", self.base_url, self.project_slug)
    }

    async fn fetch_insights(&self, branch: &str) -> MetricsResult<WorkflowInsights> {
        let mut request = self
            .client
            .get(self.workflows_url())
            .query(&[("branch", branch), ("reporting-window", REPORTING_WINDOW)]);

        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response.json().await?),

            401 | 403 => Err(MetricsError::Unauthorized {
                message: format!("CircleCI rejected the token ({status})"),
            }),

            404 => Err(MetricsError::NotFound {
                resource: format!("CircleCI project {}", self.project_slug),
            }),

            429 => Err(MetricsError::RateLimited {
                retry_after: retry_after_hint(response.headers()),
            }),

            500..=599 => Err(MetricsError::Network {
                message: format!("CircleCI server error: {status}"),
            }),

            _ => Err(MetricsError::InvalidResponse {
                message: format!("unexpected CircleCI status: {}", status_text(status)),
            }),
        }
    }
}

#[async_trait]
impl CiInsights for CircleCiClient {
    async fn median_duration_seconds(&self, branch: &str) -> MetricsResult<Option<u64>> {
        let operation = format!("CircleCI insights for {branch}");
        let insights = self.retry.run(&operation, move || self.fetch_insights(branch)).await?;

        let median = insights.items.first().map(|workflow| {
            debug!(
                branch,
                workflow = %workflow.name,
                median = workflow.metrics.duration_metrics.median,
                "CircleCI workflow median"
            );
            workflow.metrics.duration_metrics.median
        });
        Ok(median)
    }
}

fn project_slug(vcs_slug: &str, repo: &RepoId) -> String {
    format!("{}/{}/{}", vcs_slug, repo.owner, repo.repo)
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Median CI duration per branch, with "no runs" reported as zero seconds.
pub struct CiDurationSampler<C: ?Sized> {
    insights: Box<C>,
}

impl<C: CiInsights + ?Sized> CiDurationSampler<C> {
    pub fn new(insights: Box<C>) -> Self {
        Self { insights }
    }

    pub async fn sample(&self, branch: &str) -> MetricsResult<u64> {
        Ok(self
            .insights
            .median_duration_seconds(branch)
            .await?
            .unwrap_or(0))
    }

    pub async fn sample_branches(&self, staging: &str, master: &str) -> MetricsResult<CiSamples> {
        Ok(CiSamples {
            staging_seconds: self.sample(staging).await?,
            master_seconds: self.sample(master).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedInsights(HashMap<&'static str, u64>);

    #[async_trait]
    impl CiInsights for FixedInsights {
        async fn median_duration_seconds(&self, branch: &str) -> MetricsResult<Option<u64>> {
            Ok(self.0.get(branch).copied())
        }
    }

    #[tokio::test]
    async fn test_missing_branch_samples_as_zero() {
        let sampler = CiDurationSampler::new(Box::new(FixedInsights(HashMap::from([(
            "staging", 420,
        )]))));

        let samples = sampler.sample_branches("staging", "master").await.unwrap();
        assert_eq!(samples.staging_seconds, 420);
        assert_eq!(samples.master_seconds, 0);
    }

    #[test]
    fn test_project_slug() {
        let repo: RepoId = "acme/shop".parse().unwrap();
        assert_eq!(project_slug("gh", &repo), "gh/acme/shop");
    }

    #[test]
    fn test_insights_payload_decodes() {
        let body = r#"{
            "next_page_token": null,
            "items": [{
                "name": "build-and-deploy",
                "window_start": "2024-01-01T00:00:00Z",
                "window_end": "2024-03-31T00:00:00Z",
                "metrics": {
                    "total_runs": 40,
                    "success_rate": 0.95,
                    "duration_metrics": {"min": 300, "mean": 640, "median": 600, "p95": 900, "max": 1200}
                }
            }]
        }"#;
        let insights: WorkflowInsights = serde_json::from_str(body).unwrap();
        assert_eq!(insights.items[0].metrics.duration_metrics.median, 600);

        let empty: WorkflowInsights = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(empty.items.is_empty());
    }
}

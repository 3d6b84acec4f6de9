//! Service layer for computing delivery metrics for one repository.
//!
//! This module implements `MetricsQuerier`, the main entry point of a run. It:
//! 1. Lists the deployment PRs merged into the trunk branch inside the window.
//! 2. Correlates each deployment's merge commits into changes.
//! 3. Resolves every change's first commit and lead time.
//! 4. Drops bot-authored changes and samples CI durations.
//! 5. Aggregates everything into a `Report`.
//!
//! Any error aborts the run; nothing partial is returned.

use crate::bots::BotFilter;
use crate::change::ChangeRecord;
use crate::circleci::{CiDurationSampler, CircleCiClient};
use crate::config::AppConfig;
use crate::correlator::{CommitMatcher, Correlator};
use crate::error::MetricsResult;
use crate::github::GitHubClient;
use crate::metrics::{self, Report};
use crate::progress::Progress;
use crate::resolver::LeadTimeResolver;
use crate::source::{CiInsights, CommitSource, DeploymentSource};
use crate::time::DeploymentWindow;

/// Everything the version-control host has to answer.
pub trait VersionControl: DeploymentSource + CommitSource {}

impl<T: DeploymentSource + CommitSource> VersionControl for T {}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: Report,
    /// Changes used for the statistics, in deployment order.
    pub records: Vec<ChangeRecord>,
    /// Changes dropped by the bot filter.
    pub excluded: Vec<ChangeRecord>,
}

pub struct MetricsQuerier {
    vcs: Box<dyn VersionControl>,
    ci: CiDurationSampler<dyn CiInsights>,
    correlator: Correlator,
    resolver: LeadTimeResolver,
    bots: BotFilter,
    config: AppConfig,
}

impl MetricsQuerier {
    /// Initializes a querier backed by GitHub and CircleCI.
    pub fn new(config: &AppConfig) -> MetricsResult<Self> {
        let github = GitHubClient::new(config)?;
        let circleci = CircleCiClient::new(config)?;
        Ok(Self::with_collaborators(
            config,
            Box::new(github),
            Box::new(circleci),
        ))
    }

    pub fn with_collaborators(
        config: &AppConfig,
        vcs: Box<dyn VersionControl>,
        ci: Box<dyn CiInsights>,
    ) -> Self {
        let bots = BotFilter::new(&config.bot_markers);
        Self {
            vcs,
            ci: CiDurationSampler::new(ci),
            correlator: Correlator::new(
                CommitMatcher::default(),
                bots.clone(),
                config.fetch_concurrency,
            ),
            resolver: LeadTimeResolver::new(config.fetch_concurrency),
            bots,
            config: config.clone(),
        }
    }

    /// Replaces the commit matcher, e.g. to also accept squash merges.
    pub fn with_matcher(mut self, matcher: CommitMatcher) -> Self {
        self.correlator = Correlator::new(matcher, self.bots.clone(), self.config.fetch_concurrency);
        self
    }

    pub async fn run(
        &self,
        window: DeploymentWindow,
        progress: &dyn Progress,
    ) -> MetricsResult<RunOutput> {
        let repo_id = &self.config.repo;
        tracing::info!(repo_id = %repo_id, window = %window, "Computing delivery metrics");

        let deployments = self
            .vcs
            .merged_deployments(&self.config.trunk_branch, &window)
            .await?;
        progress.deployments_listed(deployments.len());

        let correlated = self
            .correlator
            .correlate(&deployments, self.vcs.as_ref(), progress)
            .await?;
        let total_change_count = correlated.len();
        tracing::info!(
            deployments = deployments.len(),
            changes = total_change_count,
            "Correlated deployment PRs"
        );

        let resolved = self
            .resolver
            .resolve_all(correlated, self.vcs.as_ref(), progress)
            .await?;

        let (records, excluded) = self.bots.partition(resolved);
        if !excluded.is_empty() {
            tracing::info!(excluded = excluded.len(), "Excluded bot-authored changes");
        }

        let ci = self
            .ci
            .sample_branches(&self.config.staging_branch, &self.config.trunk_branch)
            .await?;
        progress.ci_sampled(&self.config.staging_branch, ci.staging_seconds);
        progress.ci_sampled(&self.config.trunk_branch, ci.master_seconds);

        let report = metrics::aggregate(
            repo_id,
            window,
            deployments.len(),
            total_change_count,
            &records,
            ci,
        );

        Ok(RunOutput {
            report,
            records,
            excluded,
        })
    }
}

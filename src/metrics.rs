use crate::change::ChangeRecord;
use crate::config::RepoId;
use crate::time::{business_days, round3, seconds_to_days, DeploymentWindow};
use serde::Serialize;
use std::fmt;

/// Median CI workflow durations, in seconds, for the two promotion branches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CiSamples {
    pub staging_seconds: u64,
    pub master_seconds: u64,
}

impl CiSamples {
    pub fn total_days(&self) -> f64 {
        seconds_to_days((self.staging_seconds + self.master_seconds) as f64)
    }
}

/// Delivery metrics for one repository and window.
///
/// Metrics that would divide by zero are `None` rather than `0.0`, so an empty
/// window is distinguishable from an instant one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub repo: String,
    pub window: DeploymentWindow,
    pub business_days: u32,
    /// Deployment PRs merged into trunk in the window.
    pub deployment_count: usize,
    /// Deployments per business day, rounded to 3 decimals.
    pub deployment_frequency: Option<f64>,
    /// Correlated changes before bot filtering.
    pub total_change_count: usize,
    /// Changes that survived bot filtering; the lead-time basis.
    pub measured_change_count: usize,
    /// Mean days from first commit to trunk merge, rounded to 3 decimals.
    pub lead_time_excluding_ci: Option<f64>,
    pub staging_ci_median_seconds: u64,
    pub master_ci_median_seconds: u64,
    /// Mean lead time plus both CI medians, in days, rounded to 3 decimals.
    pub lead_time_including_ci: Option<f64>,
}

/// Combines the measured changes and CI medians into a [`Report`].
///
/// # Arguments
/// * `deployment_count` - Number of deployment PRs merged in the window.
/// * `total_change_count` - Correlated changes before bot filtering.
/// * `measured` - Changes after bot filtering; both the lead-time sum and its
///   denominator are taken from this slice.
pub fn aggregate(
    repo: &RepoId,
    window: DeploymentWindow,
    deployment_count: usize,
    total_change_count: usize,
    measured: &[ChangeRecord],
    ci: CiSamples,
) -> Report {
    let business_days = business_days(&window);

    let deployment_frequency =
        (business_days > 0).then(|| round3(deployment_count as f64 / business_days as f64));

    let mean_lead_time_days = (!measured.is_empty()).then(|| {
        let total_seconds: i64 = measured.iter().map(ChangeRecord::lead_time_seconds).sum();
        seconds_to_days(total_seconds as f64) / measured.len() as f64
    });

    Report {
        repo: repo.to_string(),
        window,
        business_days,
        deployment_count,
        deployment_frequency,
        total_change_count,
        measured_change_count: measured.len(),
        lead_time_excluding_ci: mean_lead_time_days.map(round3),
        staging_ci_median_seconds: ci.staging_seconds,
        master_ci_median_seconds: ci.master_seconds,
        lead_time_including_ci: mean_lead_time_days.map(|days| round3(days + ci.total_days())),
    }
}

struct OrNa<'a>(Option<f64>, &'a str);

impl fmt::Display for OrNa<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => write!(f, "{value}{}", self.1),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.repo, self.window)?;
        writeln!(f, "Deployments: {}", self.deployment_count)?;
        writeln!(
            f,
            "Deployment frequency: {}",
            OrNa(self.deployment_frequency, " per business day")
        )?;
        writeln!(f, "Total changes: {}", self.total_change_count)?;
        writeln!(
            f,
            "Lead time excluding CI: {}",
            OrNa(self.lead_time_excluding_ci, " days")
        )?;
        writeln!(
            f,
            "CI median: staging {}s, master {}s",
            self.staging_ci_median_seconds, self.master_ci_median_seconds
        )?;
        write!(f, "Lead time: {}", OrNa(self.lead_time_including_ci, " days"))
    }
}

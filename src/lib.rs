pub mod bots;
pub mod change;
pub mod circleci;
pub mod config;
pub mod correlator;
pub mod error;
pub mod export;
pub mod github;
pub mod metrics;
pub mod progress;
pub mod querier;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod time;

pub use change::{ChangeRecord, CorrelatedChange};
pub use config::{AppConfig, RepoId};
pub use error::{MetricsError, MetricsResult};
pub use metrics::{CiSamples, Report};
pub use querier::{MetricsQuerier, RunOutput};
pub use time::DeploymentWindow;

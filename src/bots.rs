//! Excludes changes made by dependency-update bots from the statistics.

use crate::change::ChangeRecord;

pub const DEFAULT_BOT_MARKERS: &[&str] = &["dependabot", "renovate"];

#[derive(Clone, Debug)]
pub struct BotFilter {
    markers: Vec<String>,
}

impl Default for BotFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_MARKERS.iter().copied())
    }
}

impl BotFilter {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// True if `text` contains any marker (case-insensitive).
    pub fn is_bot(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.markers.iter().any(|marker| text.contains(marker.as_str()))
    }

    /// Keeps the records whose first-commit author matches no marker.
    pub fn filter(&self, records: &[ChangeRecord]) -> Vec<ChangeRecord> {
        records
            .iter()
            .filter(|r| !self.is_bot(&r.first_commit_author))
            .cloned()
            .collect()
    }

    /// Splits records into `(kept, excluded)`.
    pub fn partition(&self, records: Vec<ChangeRecord>) -> (Vec<ChangeRecord>, Vec<ChangeRecord>) {
        records
            .into_iter()
            .partition(|r| !self.is_bot(&r.first_commit_author))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::CorrelatedChange;
    use crate::source::Commit;
    use chrono::{TimeZone, Utc};

    fn record(pr_number: u64, author: &str) -> ChangeRecord {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CorrelatedChange {
            pr_number,
            title: "change".to_string(),
            merged_into_staging_at: t,
            merged_into_master_at: t,
            deployment_number: 1,
        }
        .resolve(&Commit {
            sha: "s".to_string(),
            message: "m".to_string(),
            committed_at: t,
            author_name: author.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_excludes_any_marker() {
        let filter = BotFilter::default();
        let records = vec![
            record(1, "dependabot[bot]"),
            record(2, "alice"),
            record(3, "renovate[bot]"),
            record(4, "Bob"),
        ];

        let kept: Vec<u64> = filter.filter(&records).iter().map(|r| r.pr_number).collect();
        assert_eq!(kept, vec![2, 4]);
    }

    #[test]
    fn test_marker_match_is_case_insensitive() {
        let filter = BotFilter::default();
        assert!(filter.is_bot("Dependabot"));
        assert!(filter.is_bot("RENOVATE bot"));
        assert!(!filter.is_bot("renée"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let filter = BotFilter::default();
        let records = vec![record(1, "dependabot[bot]"), record(2, "alice")];

        let once = filter.filter(&records);
        let twice = filter.filter(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_partition_reports_excluded() {
        let filter = BotFilter::new(["ci-bot"]);
        let (kept, excluded) = filter.partition(vec![record(1, "ci-bot"), record(2, "dependabot[bot]")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].pr_number, 2);
        assert_eq!(excluded[0].pr_number, 1);
    }

    #[test]
    fn test_blank_markers_are_ignored() {
        let filter = BotFilter::new(["", "  "]);
        assert!(filter.markers().is_empty());
        assert!(!filter.is_bot("anyone"));
    }
}

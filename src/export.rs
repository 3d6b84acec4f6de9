//! CSV export of the per-change table.

use crate::change::ChangeRecord;
use crate::config::RepoId;
use crate::time::{round1, DeploymentWindow};
use chrono::{DateTime, Local, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const HEADER: &[&str] = &[
    "pr_number",
    "title",
    "first_commit_at",
    "merged_into_staging_at",
    "merged_into_master_at",
    "first_commit_author",
    "lead_time",
];

/// `<dir>/<repo name>_<from>_<to>.csv`
pub fn output_path(dir: impl AsRef<Path>, repo: &RepoId, window: &DeploymentWindow) -> PathBuf {
    dir.as_ref()
        .join(format!("{}_{}_{}.csv", repo.repo, window.from, window.to))
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn local_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_record(record: &ChangeRecord) -> String {
    [
        record.pr_number.to_string(),
        escape_field(&record.title),
        local_timestamp(record.first_commit_at),
        local_timestamp(record.merged_into_staging_at),
        local_timestamp(record.merged_into_master_at),
        escape_field(&record.first_commit_author),
        format!("{:.1}", round1(record.lead_time_days())),
    ]
    .join(",")
}

/// Renders the table, header first, one line per record.
pub fn render_csv(records: &[ChangeRecord]) -> String {
    let mut output = HEADER.join(",");
    output.push('\n');
    for record in records {
        output.push_str(&format_record(record));
        output.push('\n');
    }
    output
}

/// Writes the table to `path`, creating the parent directory if needed.
pub fn write_csv(path: &Path, records: &[ChangeRecord]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, render_csv(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::CorrelatedChange;
    use crate::source::Commit;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn record(title: &str, author: &str) -> ChangeRecord {
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CorrelatedChange {
            pr_number: 42,
            title: title.to_string(),
            merged_into_staging_at: first + Duration::hours(30),
            merged_into_master_at: first + Duration::hours(60),
            deployment_number: 7,
        }
        .resolve(&Commit {
            sha: "s".to_string(),
            message: "m".to_string(),
            committed_at: first,
            author_name: author.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_output_path() {
        let repo: RepoId = "acme/shop".parse().unwrap();
        let window = DeploymentWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        )
        .unwrap();
        assert_eq!(
            output_path("artifacts", &repo, &window),
            PathBuf::from("artifacts/shop_2024-01-01_2024-01-15.csv")
        );
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&[record("Add login form", "alice")]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(
            lines[0],
            "pr_number,title,first_commit_at,merged_into_staging_at,merged_into_master_at,first_commit_author,lead_time"
        );
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[0], "42");
        assert_eq!(fields[1], "Add login form");
        assert_eq!(fields[2].len(), "2024-01-01 00:00:00".len());
        assert_eq!(fields[5], "alice");
        assert_eq!(fields[6], "2.5");
    }

    #[test]
    fn test_fields_are_escaped() {
        let csv = render_csv(&[record("Fix \"quotes\", commas", "bob")]);
        assert!(csv.contains("\"Fix \"\"quotes\"\", commas\""));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("shop.csv");

        write_csv(&path, &[record("x", "alice")]).unwrap();
        write_csv(&path, &[]).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}

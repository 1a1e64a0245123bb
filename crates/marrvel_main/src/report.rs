use std::path::{Path, PathBuf};

use anyhow::Context;
use marrvel_app::BatchReport;

/// Default location of a run's report, next to its cached results.
pub fn default_report_path(cache_dir: &Path, report: &BatchReport) -> PathBuf {
    cache_dir.join(report.run_id.as_str()).join("report.json")
}

pub async fn write_report(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use marrvel_domain::{Classification, Mode, RunId, RunStats, Status, TestCase, TestResult};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let case = TestCase::new("Capital of France?", "Paris");
        let fixture = BatchReport {
            run_id: RunId::new("r1").unwrap(),
            mode: Mode::Vanilla,
            stats: RunStats { yes: 1, no: 0, failed: 0 },
            results: vec![
                TestResult::new(
                    case.uuid,
                    0,
                    Mode::Vanilla,
                    Some("gpt-4o".into()),
                    "Capital of France?",
                    "Paris",
                )
                .classified(Status::Completed, Classification::yes("matches")),
            ],
        };
        let path = default_report_path(dir.path(), &fixture);

        write_report(&path, &fixture).await.unwrap();

        let actual: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(path, dir.path().join("r1").join("report.json"));
        assert_eq!(actual["run_id"], json!("r1"));
        assert_eq!(actual["mode"], json!("vanilla"));
        assert_eq!(actual["stats"], json!({"yes": 1, "no": 0, "failed": 0}));
        assert_eq!(actual["results"][0]["classification"], json!("yes - matches"));
        assert_eq!(actual["results"][0]["status"], json!("completed"));
    }
}

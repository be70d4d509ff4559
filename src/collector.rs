use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::archive::unzip;
use crate::error::{Result, TestStatsError};
use crate::providers::{GitHubArtifact, GitHubClient, S3Client};
use crate::report::{parse_xml_report, Record};

/// Downloads, extracts, and normalizes every test report for one workflow
/// run attempt.
///
/// Reports come from two sources: the S3 artifact bucket and the GitHub
/// Actions artifact API. Everything runs sequentially; the first failure
/// aborts the run.
pub struct Collector {
    s3: S3Client,
    github: GitHubClient,
    /// Repository path, e.g. "pytorch/pytorch"; doubles as the bucket prefix
    repo_path: String,
    workflow_run_id: u64,
    workflow_run_attempt: u64,
}

impl Collector {
    pub fn new(
        s3: S3Client,
        github: GitHubClient,
        repo_path: String,
        workflow_run_id: u64,
        workflow_run_attempt: u64,
    ) -> Self {
        Self {
            s3,
            github,
            repo_path,
            workflow_run_id,
            workflow_run_attempt,
        }
    }

    /// Runs the retrieval and normalization stages.
    ///
    /// Returns the test case records and the test suite records, in that
    /// order. The working directory lives only for the duration of the call.
    pub async fn collect(&self) -> Result<(Vec<Record>, Vec<Record>)> {
        let workdir = TempDir::new()?;
        info!("Using temporary directory: {}", workdir.path().display());

        self.download_s3_reports(workdir.path()).await?;
        self.download_github_artifacts(workdir.path()).await?;

        let mut test_cases = Vec::new();
        let mut test_suites = Vec::new();
        for report in xml_reports(workdir.path()) {
            test_cases.extend(parse_xml_report(
                "testcase",
                workdir.path(),
                &report,
                self.workflow_run_id,
                self.workflow_run_attempt,
            )?);
            test_suites.extend(parse_xml_report(
                "testsuite",
                workdir.path(),
                &report,
                self.workflow_run_id,
                self.workflow_run_attempt,
            )?);
        }

        Ok((test_cases, test_suites))
    }

    /// Downloads and extracts every report archive stored in S3.
    ///
    /// An empty listing means the upstream workflow never uploaded its
    /// reports, which indicates a bug rather than a legitimately empty run.
    async fn download_s3_reports(&self, workdir: &Path) -> Result<()> {
        let prefix = format!(
            "{}/{}/{}/artifact/test-reports",
            self.repo_path, self.workflow_run_id, self.workflow_run_attempt
        );

        let keys = self.s3.list_keys(&prefix).await?;
        if keys.is_empty() {
            return Err(TestStatsError::NoReports);
        }

        for key in keys {
            let name = key.rsplit('/').next().unwrap_or(&key);
            info!("Downloading and extracting {name}");

            let destination = workdir.join(name);
            self.s3.download_object(&key, &destination).await?;
            unzip(&destination)?;
        }

        Ok(())
    }

    /// Downloads and extracts every matching artifact from the GitHub API.
    async fn download_github_artifacts(&self, workdir: &Path) -> Result<()> {
        let artifacts = self
            .github
            .list_test_report_artifacts(self.workflow_run_id)
            .await?;

        for artifact in artifacts {
            self.download_and_extract_artifact(&artifact, workdir)
                .await?;
        }

        Ok(())
    }

    async fn download_and_extract_artifact(
        &self,
        artifact: &GitHubArtifact,
        workdir: &Path,
    ) -> Result<()> {
        // Artifacts from re-run workflows share a namespace, so upstream
        // embeds a `runattempt<N>` token in the name. A mismatch only logs a
        // warning today; the artifact is still downloaded and extracted.
        for atom in artifact.name.split('-') {
            if let Some(digits) = atom.strip_prefix("runattempt") {
                let found_run_attempt: u64 = digits.parse().map_err(|_| {
                    TestStatsError::Config(format!(
                        "Invalid run attempt token in artifact name: {}",
                        artifact.name
                    ))
                })?;

                if found_run_attempt != self.workflow_run_attempt {
                    warn!(
                        "Skipping {} as it is an invalid run attempt. Expected {}, found {}.",
                        artifact.name, self.workflow_run_attempt, found_run_attempt
                    );
                }
            }
        }

        info!("Downloading and extracting {}", artifact.name);

        let destination = workdir.join(&artifact.name);
        self.github.download_artifact(artifact, &destination).await?;
        unzip(&destination)?;

        Ok(())
    }
}

/// Every `*.xml` file under `workdir`, as paths relative to it.
///
/// The walk is sorted so record order is stable across runs.
fn xml_reports(workdir: &Path) -> Vec<PathBuf> {
    WalkDir::new(workdir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|extension| extension == "xml")
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(workdir)
                .ok()
                .map(Path::to_path_buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use serde_json::json;
    use std::fs;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn collector(server_url: &str, attempt: u64) -> Collector {
        let s3 = S3Client::new(server_url, "gha-artifacts").unwrap();
        let github =
            GitHubClient::new(server_url.to_string(), "org/repo", &Token::from("t")).unwrap();
        Collector::new(s3, github, "org/repo".to_string(), 42, attempt)
    }

    #[test]
    fn test_xml_reports_walks_recursively_and_relativizes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("unzipped-reports_1").join("test");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("TEST-a.xml"), "<x/>").unwrap();
        fs::write(nested.join("notes.txt"), "skip me").unwrap();
        fs::write(dir.path().join("TEST-b.xml"), "<y/>").unwrap();

        let reports = xml_reports(dir.path());

        assert_eq!(
            reports,
            vec![
                PathBuf::from("TEST-b.xml"),
                PathBuf::from("unzipped-reports_1/test/TEST-a.xml"),
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_fails_when_s3_has_no_reports() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gha-artifacts/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>")
            .create_async()
            .await;

        let result = collector(&server.url(), 1).collect().await;
        assert!(matches!(result, Err(TestStatsError::NoReports)));
    }

    #[tokio::test]
    async fn test_collect_end_to_end() {
        let mut server = mockito::Server::new_async().await;

        // One archive in S3.
        let s3_key = "org/repo/42/1/artifact/test-reports/test-reports-s3-runattempt1-foo_11.zip";
        server
            .mock("GET", "/gha-artifacts/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(format!(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>{s3_key}</Key></Contents></ListBucketResult>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", format!("/gha-artifacts/{s3_key}").as_str())
            .with_status(200)
            .with_body(zip_bytes(&[(
                "test/TEST-foo.xml",
                r#"<testsuite name="Foo" tests="1"><testcase name="bar" time="0.5"/></testsuite>"#,
            )]))
            .create_async()
            .await;

        // One artifact from the GitHub API, plus one with a mismatched run
        // attempt which still gets extracted (warn-only behavior).
        server
            .mock("GET", "/repos/org/repo/actions/runs/42/artifacts")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(format!(
                r#"{{"artifacts": [
                    {{"name": "test-reports-gha-runattempt1-baz_22", "archive_download_url": "{0}/dl/a"}},
                    {{"name": "test-reports-gha-runattempt2-qux_33", "archive_download_url": "{0}/dl/b"}}
                ]}}"#,
                server.url()
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/dl/a")
            .with_status(200)
            .with_body(zip_bytes(&[(
                "TEST-baz.xml",
                r#"<testsuite name="Baz" tests="1"><testcase name="baz_case" time="2"/></testsuite>"#,
            )]))
            .create_async()
            .await;
        let mismatched_download = server
            .mock("GET", "/dl/b")
            .with_status(200)
            .with_body(zip_bytes(&[(
                "TEST-qux.xml",
                r#"<testsuite name="Qux" tests="1"><testcase name="qux_case" time="3"/></testsuite>"#,
            )]))
            .create_async()
            .await;

        let (test_cases, test_suites) = collector(&server.url(), 1).collect().await.unwrap();

        // The mismatched artifact is downloaded anyway.
        mismatched_download.assert_async().await;

        assert_eq!(test_cases.len(), 3);
        assert_eq!(test_suites.len(), 3);

        let names: Vec<_> = test_cases.iter().map(|r| r["name"].clone()).collect();
        assert!(names.contains(&json!("bar")));
        assert!(names.contains(&json!("baz_case")));
        assert!(names.contains(&json!("qux_case")));

        let s3_case = test_cases
            .iter()
            .find(|r| r["name"] == json!("bar"))
            .unwrap();
        assert_eq!(s3_case["time"], json!(0.5));
        assert_eq!(s3_case["workflow_id"], json!(42));
        assert_eq!(s3_case["workflow_run_attempt"], json!(1));
        assert_eq!(s3_case["job_id"], json!(11));

        let gha_suite = test_suites
            .iter()
            .find(|r| r["name"] == json!("Baz"))
            .unwrap();
        assert_eq!(gha_suite["tests"], json!(1));
        assert_eq!(gha_suite["job_id"], json!(22));
        assert_eq!(gha_suite["testcase"], json!({"name": "baz_case", "time": 2}));
    }

    #[tokio::test]
    async fn test_collect_rejects_malformed_attempt_token() {
        let mut server = mockito::Server::new_async().await;

        let s3_key = "org/repo/42/1/artifact/test-reports/test-reports-foo_11.zip";
        server
            .mock("GET", "/gha-artifacts/")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(format!(
                "<ListBucketResult><IsTruncated>false</IsTruncated>\
                 <Contents><Key>{s3_key}</Key></Contents></ListBucketResult>"
            ))
            .create_async()
            .await;
        server
            .mock("GET", format!("/gha-artifacts/{s3_key}").as_str())
            .with_status(200)
            .with_body(zip_bytes(&[("TEST-foo.xml", "<testsuite/>")]))
            .create_async()
            .await;
        server
            .mock("GET", "/repos/org/repo/actions/runs/42/artifacts")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"artifacts": [
                    {"name": "test-reports-runattemptX-foo_1", "archive_download_url": "http://unused/"}
                ]}"#,
            )
            .create_async()
            .await;

        let result = collector(&server.url(), 1).collect().await;
        assert!(matches!(result, Err(TestStatsError::Config(_))));
    }
}

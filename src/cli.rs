use anyhow::Result;
use clap::Parser;
use log::info;

use crate::auth::Token;
use crate::collector::Collector;
use crate::providers::{GitHubClient, RocksetClient, S3Client};

/// Collection receiving one document per test case.
const TEST_CASE_COLLECTION: &str = "test_run";
/// Collection receiving one document per test suite.
const TEST_SUITE_COLLECTION: &str = "test_suite";

#[derive(Parser)]
#[command(name = "teststats")]
#[command(author, version, about = "Upload CI test reports to the analytics store", long_about = None)]
pub struct Cli {
    /// Id of the workflow run to get artifacts from
    #[arg(long)]
    workflow_run_id: u64,

    /// Which retry of the workflow this is
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    workflow_run_attempt: u64,

    /// GitHub token used to list and download workflow artifacts
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Rockset API key used to ingest the normalized records
    #[arg(long, env = "ROCKSET_API_KEY", hide_env_values = true)]
    rockset_api_key: String,

    /// Repository whose test reports are aggregated
    #[arg(long, default_value = "pytorch/pytorch")]
    repo: String,

    /// GitHub API base URL
    #[arg(long, default_value = "https://api.github.com")]
    github_url: String,

    /// S3 endpoint hosting the artifact bucket
    #[arg(long, default_value = "https://s3.amazonaws.com")]
    s3_url: String,

    /// Bucket holding workflow artifacts
    #[arg(long, default_value = "gha-artifacts")]
    bucket: String,

    /// Rockset API server
    #[arg(long, default_value = "https://api.rs2.usw2.rockset.com")]
    rockset_url: String,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        info!(
            "Aggregating test reports for run {} attempt {}",
            self.workflow_run_id, self.workflow_run_attempt
        );

        let github = GitHubClient::new(
            self.github_url.clone(),
            &self.repo,
            &Token::from(self.github_token.as_str()),
        )?;
        let s3 = S3Client::new(&self.s3_url, &self.bucket)?;
        let rockset = RocksetClient::new(
            &self.rockset_url,
            &Token::from(self.rockset_api_key.as_str()),
        )?;

        let collector = Collector::new(
            s3,
            github,
            self.repo.clone(),
            self.workflow_run_id,
            self.workflow_run_attempt,
        );
        let (test_cases, test_suites) = collector.collect().await?;

        rockset.add_docs(TEST_CASE_COLLECTION, &test_cases).await?;
        rockset.add_docs(TEST_SUITE_COLLECTION, &test_suites).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_required_arguments() {
        let cli = Cli::parse_from([
            "teststats",
            "--workflow-run-id",
            "123",
            "--workflow-run-attempt",
            "2",
            "--github-token",
            "gh-token",
            "--rockset-api-key",
            "rs-key",
        ]);

        assert_eq!(cli.workflow_run_id, 123);
        assert_eq!(cli.workflow_run_attempt, 2);
        assert_eq!(cli.repo, "pytorch/pytorch");
        assert_eq!(cli.bucket, "gha-artifacts");
    }

    #[test]
    fn test_cli_rejects_attempt_zero() {
        let result = Cli::try_parse_from([
            "teststats",
            "--workflow-run-id",
            "123",
            "--workflow-run-attempt",
            "0",
            "--github-token",
            "gh-token",
            "--rockset-api-key",
            "rs-key",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_run_id() {
        let result = Cli::try_parse_from([
            "teststats",
            "--workflow-run-attempt",
            "1",
            "--github-token",
            "gh-token",
            "--rockset-api-key",
            "rs-key",
        ]);

        assert!(result.is_err());
    }
}

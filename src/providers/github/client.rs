use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};

use crate::auth::Token;
use crate::error::{Result, TestStatsError};
use crate::providers::check_status;

use super::types::{ArtifactsResponse, GitHubArtifact};

/// GitHub API client for listing and downloading workflow artifacts.
#[derive(Clone, Debug)]
pub struct GitHubClient {
    /// HTTP client
    client: reqwest::Client,
    /// Base URL for GitHub API
    base_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
}

impl GitHubClient {
    /// Create a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., "https://api.github.com")
    /// * `repo_path` - Repository path in format "owner/repo"
    /// * `token` - GitHub token used for artifact downloads
    ///
    /// # Returns
    ///
    /// A configured GitHub API client.
    pub fn new(base_url: String, repo_path: &str, token: &Token) -> Result<Self> {
        let parts: Vec<&str> = repo_path.split('/').collect();
        if parts.len() != 2 {
            return Err(TestStatsError::Config(
                "Repository path must be in format 'owner/repo'".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("teststats/0.3"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let mut auth = HeaderValue::from_str(&format!("token {}", token.as_str()))
            .map_err(|e| TestStatsError::Config(format!("Invalid GitHub token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TestStatsError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            owner: parts[0].to_string(),
            repo: parts[1].to_string(),
        })
    }

    /// Fetch all workflow artifacts with 'test-report' in the name.
    ///
    /// Follows the `Link` header `next` relation until the listing is
    /// exhausted.
    pub async fn list_test_report_artifacts(
        &self,
        workflow_run_id: u64,
    ) -> Result<Vec<GitHubArtifact>> {
        let mut url = format!(
            "{}/repos/{}/{}/actions/runs/{}/artifacts?per_page=100",
            self.base_url, self.owner, self.repo, workflow_run_id
        );

        let mut artifacts = Vec::new();
        loop {
            let response = check_status(self.client.get(&url).send().await?).await?;
            let next = next_link(response.headers());

            let page: ArtifactsResponse = response.json().await?;
            artifacts.extend(page.artifacts);

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        artifacts.retain(|artifact| artifact.name.contains("test-report"));
        Ok(artifacts)
    }

    /// Download one artifact's zip archive to `destination`.
    pub async fn download_artifact(
        &self,
        artifact: &GitHubArtifact,
        destination: &Path,
    ) -> Result<()> {
        let response = self
            .client
            .get(&artifact.archive_download_url)
            .send()
            .await?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await?;
        std::fs::write(destination, &bytes)?;

        Ok(())
    }
}

/// Extracts the `next` relation URL from a `Link` header, if present.
///
/// GitHub formats the header as:
///     Link: <https://...&page=2>; rel="next", <https://...&page=5>; rel="last"
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;

    for entry in link.split(',') {
        let mut segments = entry.split(';');
        let url = segments
            .next()
            .map(|url| url.trim().trim_start_matches('<').trim_end_matches('>'))?;

        if segments.any(|segment| segment.trim() == r#"rel="next""#) {
            return Some(url.to_owned());
        }
    }

    None
}

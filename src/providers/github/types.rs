use serde::Deserialize;

/// One artifact entry from the GitHub Actions artifact listing.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubArtifact {
    /// Artifact name as produced by the upstream workflow
    pub name: String,
    /// URL of the artifact's zip archive
    pub archive_download_url: String,
}

/// Response from the GitHub API for a page of workflow artifacts.
#[derive(Deserialize)]
pub(super) struct ArtifactsResponse {
    pub artifacts: Vec<GitHubArtifact>,
}

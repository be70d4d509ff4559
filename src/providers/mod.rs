mod github;
mod rockset;
mod s3;

pub use github::{GitHubArtifact, GitHubClient};
pub use rockset::RocksetClient;
pub use s3::S3Client;

use crate::error::{Result, TestStatsError};

/// Converts a non-success response into an `Api` error, keeping the response
/// body as the error message.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    Err(TestStatsError::Api {
        status: status.as_u16(),
        message,
    })
}

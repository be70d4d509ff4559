use std::path::Path;

use url::Url;

use crate::error::{Result, TestStatsError};
use crate::providers::check_status;

/// Minimal client for a world-readable S3 bucket.
///
/// Lists keys with the ListObjectsV2 REST API and fetches objects with plain
/// GETs; the CI artifact bucket is public, so no request signing is needed.
/// Uses path-style addressing so the client also works against a local mock
/// server.
pub struct S3Client {
    /// HTTP client
    client: reqwest::Client,
    /// Bucket root, e.g. "https://s3.amazonaws.com/gha-artifacts/"
    bucket_url: Url,
}

/// One page of a ListObjectsV2 response.
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

impl S3Client {
    /// Create a new client for `bucket` hosted at `base_url`.
    pub fn new(base_url: &str, bucket: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("teststats/0.3")
            .build()
            .map_err(|e| TestStatsError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = Url::parse(base_url)
            .map_err(|e| TestStatsError::Config(format!("Invalid S3 base URL: {e}")))?;
        let bucket_url = base
            .join(&format!("{bucket}/"))
            .map_err(|e| TestStatsError::Config(format!("Invalid bucket URL: {e}")))?;

        Ok(Self { client, bucket_url })
    }

    /// List every object key under `prefix`, following continuation tokens
    /// until the listing is exhausted.
    pub async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = self.bucket_url.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("list-type", "2");
                query.append_pair("prefix", prefix);
                if let Some(token) = &continuation {
                    query.append_pair("continuation-token", token);
                }
            }

            let response = check_status(self.client.get(url).send().await?).await?;
            let page = parse_list_response(&response.text().await?)?;

            keys.extend(page.keys);
            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    /// Download one object into `destination`.
    pub async fn download_object(&self, key: &str, destination: &Path) -> Result<()> {
        let url = self
            .bucket_url
            .join(key)
            .map_err(|e| TestStatsError::Config(format!("Invalid object key '{key}': {e}")))?;

        let response = check_status(self.client.get(url).send().await?).await?;
        let bytes = response.bytes().await?;
        std::fs::write(destination, &bytes)?;

        Ok(())
    }
}

/// Parses one ListObjectsV2 XML response.
///
/// Tag names are matched without their namespace, since S3 serves the
/// response under a default namespace.
fn parse_list_response(xml: &str) -> Result<ListPage> {
    let document = roxmltree::Document::parse(xml)?;
    let root = document.root_element();

    let keys = root
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "Contents")
        .filter_map(|contents| {
            contents
                .children()
                .find(|node| node.tag_name().name() == "Key")
                .and_then(|key| key.text())
                .map(str::to_owned)
        })
        .collect();

    let truncated = root
        .children()
        .find(|node| node.tag_name().name() == "IsTruncated")
        .and_then(|node| node.text())
        == Some("true");

    let next_token = if truncated {
        root.children()
            .find(|node| node.tag_name().name() == "NextContinuationToken")
            .and_then(|node| node.text())
            .map(str::to_owned)
    } else {
        None
    };

    Ok(ListPage { keys, next_token })
}

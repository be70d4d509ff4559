use log::info;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{Result, TestStatsError};
use crate::providers::check_status;
use crate::report::Record;

/// All documents go into the shared workspace.
const WORKSPACE: &str = "commons";

/// Rockset ingestion client.
pub struct RocksetClient {
    /// HTTP client
    client: reqwest::Client,
    /// Rockset API server, e.g. "https://api.rs2.usw2.rockset.com"
    base_url: Url,
}

/// Body of an "add documents" request.
#[derive(Serialize)]
struct AddDocsRequest<'a> {
    data: &'a [Record],
}

impl RocksetClient {
    /// Create a new ingestion client.
    pub fn new(base_url: &str, api_key: &Token) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("ApiKey {}", api_key.as_str()))
            .map_err(|e| TestStatsError::Config(format!("Invalid Rockset API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .user_agent("teststats/0.3")
            .default_headers(headers)
            .build()
            .map_err(|e| TestStatsError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| TestStatsError::Config(format!("Invalid Rockset API server: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Write the whole batch to `collection` in a single request.
    ///
    /// There is no chunking, retry, or partial-success handling; a non-2xx
    /// response fails the run.
    pub async fn add_docs(&self, collection: &str, docs: &[Record]) -> Result<()> {
        info!("Writing {} documents to Rockset", docs.len());

        let url = self
            .base_url
            .join(&format!(
                "v1/orgs/self/ws/{WORKSPACE}/collections/{collection}/docs"
            ))
            .map_err(|e| TestStatsError::Config(format!("Invalid collection name: {e}")))?;

        let response = self
            .client
            .post(url)
            .json(&AddDocsRequest { data: docs })
            .send()
            .await?;
        check_status(response).await?;

        info!("Done!");
        Ok(())
    }
}

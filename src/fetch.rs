//! NZB payload fetching
//!
//! HTTP indexer access is an injected capability so the runner can be
//! exercised against canned payloads.

use crate::error::{Result, TriageError};
use async_trait::async_trait;
use std::time::Duration;

/// Accept header advertised on NZB downloads
const ACCEPT: &str = "application/x-nzb,text/xml;q=0.9,*/*;q=0.8";

/// User-Agent advertised on NZB downloads
const USER_AGENT: &str = "UsenetStreamer-Triage";

/// Downloads NZB payloads as UTF-8 text
#[async_trait]
pub trait NzbFetcher: Send + Sync {
    /// Fetch one NZB payload. An empty body is a failure.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher with a per-request timeout
pub struct HttpNzbFetcher {
    client: reqwest::Client,
}

impl HttpNzbFetcher {
    /// Build a fetcher with the given per-request timeout
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| TriageError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NzbFetcher for HttpNzbFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| TriageError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TriageError::Fetch(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TriageError::Fetch(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(TriageError::Fetch(format!("empty body for {}", url)));
        }

        Ok(body)
    }
}

//! CDN access: version list and per-version tarballs

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use semver::Version;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::MirrorConfig;
use crate::error::{MirrorError, PublishStep, Result};
use crate::version::{parse_version_list, VersionWindow};

/// Read side of the CDN
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// The trailing `k` versions of the CDN's version list
    ///
    /// Fails with `SourceUnavailable` when the list cannot be fetched or
    /// holds no valid versions.
    async fn fetch_version_window(&self, k: usize) -> Result<VersionWindow>;

    /// Download the packaged tarball for one version
    async fn download_artifact(&self, version: &Version) -> Result<Bytes>;
}

/// Shared HTTP client setup for CDN and registry requests
pub(crate) fn build_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("republish/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}

/// CDN client over plain HTTPS
pub struct HttpCdn {
    client: reqwest::Client,
    config: MirrorConfig,
}

impl HttpCdn {
    pub fn new(config: &MirrorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(config.http_timeout_seconds)?,
            config: config.clone(),
        })
    }

    pub fn artifact_url(&self, version: &Version) -> String {
        self.config.artifact_url(version)
    }

    fn unavailable(&self, reason: impl Into<String>) -> MirrorError {
        MirrorError::SourceUnavailable {
            url: self.config.version_list_url.clone(),
            reason: reason.into(),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed: HTTP {} for {}", response.status(), url);
        }

        response
            .bytes()
            .await
            .context("Failed to read download response")
    }
}

#[async_trait]
impl CdnClient for HttpCdn {
    async fn fetch_version_window(&self, k: usize) -> Result<VersionWindow> {
        debug!("Fetching CDN version list from {}", self.config.version_list_url);

        let response = self
            .client
            .get(&self.config.version_list_url)
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.unavailable(format!("failed to read response body: {e}")))?;

        let window = parse_version_list(&body, k);
        if window.is_empty() {
            return Err(self.unavailable("version list contains no valid versions"));
        }

        info!("Latest {} versions on CDN: {}", window.len(), window);
        Ok(window)
    }

    async fn download_artifact(&self, version: &Version) -> Result<Bytes> {
        let url = self.artifact_url(version);
        debug!("Downloading {}", url);

        self.fetch_bytes(&url)
            .await
            .map_err(|e| MirrorError::step(version, PublishStep::Install, e))
    }
}

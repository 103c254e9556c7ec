//! Registry access: `latest` baseline lookup and archive publishing
//!
//! The lookup uses the registry's HTTP API directly. Publishing goes through
//! the package manager CLI so the operator's existing auth (`.npmrc`,
//! `NODE_AUTH_TOKEN`) applies unchanged.

use anyhow::Context;
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, info};

use crate::cdn::build_http_client;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, PublishStep, Result};

/// Registry operations the pipeline depends on
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Version currently tagged `latest`, or `None` if never published
    async fn latest_version(&self, package: &str) -> Result<Option<Version>>;

    /// Publish an archive; the package name comes from its manifest
    ///
    /// `version` labels the failure. A registry rejection (for example a
    /// version that already exists) is an error.
    async fn publish(&self, archive: &Path, version: &Version) -> Result<()>;
}

/// Subset of the registry's version document
#[derive(Debug, Deserialize)]
struct LatestDocument {
    version: String,
}

/// npm-compatible registry
pub struct NpmRegistry {
    client: reqwest::Client,
    registry_url: String,
    npm_bin: String,
    publish_args: Vec<String>,
}

impl NpmRegistry {
    pub fn new(config: &MirrorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_http_client(config.http_timeout_seconds)?,
            registry_url: config.registry_url.trim_end_matches('/').to_string(),
            npm_bin: config.npm_bin.clone(),
            publish_args: config.publish_args.clone(),
        })
    }

    /// `GET` URL for the `latest` dist-tag of a package
    ///
    /// Scoped names keep their `@` but encode the separating slash.
    pub fn latest_url(&self, package: &str) -> String {
        format!("{}/{}/latest", self.registry_url, package.replace('/', "%2f"))
    }

    async fn run_publish(&self, archive: &Path) -> anyhow::Result<()> {
        debug!(
            "Running {} publish {} {:?}",
            self.npm_bin,
            archive.display(),
            self.publish_args
        );

        let output = tokio::process::Command::new(&self.npm_bin)
            .arg("publish")
            .arg(archive)
            .args(&self.publish_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn '{}'", self.npm_bin))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} publish output: {}", self.npm_bin, stdout.trim());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "{} publish exited with status {}: {}",
                self.npm_bin,
                exit_code,
                stderr.trim()
            );
        }

        Ok(())
    }
}

#[async_trait]
impl RegistryClient for NpmRegistry {
    async fn latest_version(&self, package: &str) -> Result<Option<Version>> {
        let url = self.latest_url(package);
        let unavailable = |reason: String| MirrorError::BaselineUnavailable {
            package: package.to_string(),
            reason,
        };

        debug!("Querying registry baseline at {}", url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!("Package '{}' has not been published yet", package);
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {} from {}", response.status(), url)));
        }

        let document: LatestDocument = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid registry response: {e}")))?;

        let version = Version::parse(&document.version).map_err(|e| {
            unavailable(format!("registry version '{}' is not valid semver: {e}", document.version))
        })?;

        info!("Latest published version of '{}': {}", package, version);
        Ok(Some(version))
    }

    async fn publish(&self, archive: &Path, version: &Version) -> Result<()> {
        self.run_publish(archive)
            .await
            .map_err(|e| MirrorError::step(version, PublishStep::Publish, e))
    }
}

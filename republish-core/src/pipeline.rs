//! The mirror run
//!
//! ```text
//! CDN version list ──┐
//!                    ├──► resolve ──► for each version: install → rewrite → repack → publish
//! registry latest ───┘                                                         │
//!                                                                              ▼
//!                                                                       clean staging
//! ```
//!
//! Everything runs strictly in sequence. The first failure aborts the run and
//! leaves the staging tree in place for inspection.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cdn::CdnClient;
use crate::config::MirrorConfig;
use crate::error::{MirrorError, PublishStep, Result};
use crate::packager::Packager;
use crate::registry::RegistryClient;
use crate::resolver::{resolve_publish_set, ResolveOptions};
use crate::staging::Staging;
use crate::version::{join_versions, VersionWindow};

/// CI annotation for a run with nothing to publish
pub const NO_ACTION_NOTICE: &str =
    "::notice title=No action required::There is no new package to publish.";

/// Per-run switches that are not part of the mirror configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stage and pack every version but skip the registry publish
    pub dry_run: bool,

    /// Leave the staging tree in place after a successful run
    pub keep_staging: bool,
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub window: VersionWindow,
    pub baseline: Option<Version>,
    pub publish_set: Vec<Version>,
    pub published: Vec<Version>,
    /// Archives left on disk, only populated when staging is kept
    pub archives: Vec<PathBuf>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// True when no CDN version was newer than the registry baseline
    pub fn is_noop(&self) -> bool {
        self.publish_set.is_empty()
    }
}

/// A configured mirror pipeline
pub struct Pipeline {
    config: MirrorConfig,
    cdn: Box<dyn CdnClient>,
    registry: Box<dyn RegistryClient>,
    packager: Box<dyn Packager>,
    staging: Staging,
}

impl Pipeline {
    pub fn new(
        config: MirrorConfig,
        cdn: Box<dyn CdnClient>,
        registry: Box<dyn RegistryClient>,
        packager: Box<dyn Packager>,
    ) -> Self {
        let staging = Staging::new(config.staging_dir.clone());
        Self {
            config,
            cdn,
            registry,
            packager,
            staging,
        }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    /// Execute one mirror run
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let started_at = Utc::now();

        let window = self.cdn.fetch_version_window(self.config.window_size).await?;
        let baseline = self
            .registry
            .latest_version(&self.config.target_package)
            .await?;

        let publish_set = resolve_publish_set(
            &self.config.target_package,
            &window,
            baseline.as_ref(),
            ResolveOptions {
                include_prerelease: self.config.include_prerelease,
                first_publish: self.config.first_publish,
            },
        )?;

        info!(
            "Found {} versions to publish: {}",
            publish_set.len(),
            join_versions(&publish_set)
        );
        let baseline_display = baseline
            .as_ref()
            .map_or_else(|| "none".to_string(), Version::to_string);
        info!(
            latest_registry_version = %baseline_display,
            latest_cdn_versions = %window,
            versions_to_publish = %join_versions(&publish_set),
            "Resolved publish set"
        );

        if publish_set.is_empty() {
            info!("There is no new package to publish.");
        }

        let mut published = Vec::with_capacity(publish_set.len());
        let mut archives = Vec::with_capacity(publish_set.len());
        for version in &publish_set {
            let archive = self.publish_version(version, options.dry_run).await?;
            if !options.dry_run {
                published.push(version.clone());
            }
            archives.push(archive);
        }

        if options.keep_staging {
            info!(
                "Keeping local install folder at {}",
                self.staging.root().display()
            );
        } else {
            info!("Cleaning up local install folder...");
            self.staging.clean()?;
            archives.clear();
        }

        Ok(RunReport {
            window,
            baseline,
            publish_set,
            published,
            archives,
            dry_run: options.dry_run,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Install, rewrite, repack and publish one version
    async fn publish_version(&self, version: &Version, dry_run: bool) -> Result<PathBuf> {
        let target = &self.config.target_package;

        info!("[{}] Installing from CDN into local folder...", version);
        let entry = self
            .staging
            .prepare(version)
            .map_err(|e| MirrorError::step(version, PublishStep::Install, e))?;
        let tarball = self.cdn.download_artifact(version).await?;
        let package_dir = self
            .packager
            .install(&tarball, &entry)
            .map_err(|e| MirrorError::step(version, PublishStep::Install, e))?;

        info!("[{}] Updating package.json...", version);
        self.packager
            .rewrite(&package_dir, target, &self.config.repository_url, version)
            .map_err(|e| MirrorError::step(version, PublishStep::Rewrite, e))?;

        info!("[{}] Creating tarball...", version);
        let archive = self
            .packager
            .pack(&package_dir, &entry, target, version)
            .map_err(|e| MirrorError::step(version, PublishStep::Repack, e))?;

        if dry_run {
            warn!(
                "[{}] Dry run: skipping publish of {}",
                version,
                archive.display()
            );
        } else {
            info!("[{}] Publish tarball to registry...", version);
            self.registry.publish(&archive, version).await?;
        }

        Ok(archive)
    }
}

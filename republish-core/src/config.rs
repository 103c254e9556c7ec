//! Mirror configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. `--config <path>` on the command line
//! 2. `./republish.yaml` in the working directory
//! 3. Built-in defaults
//!
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! ```yaml
//! source_package: xlsx
//! target_package: xlsx-republish
//! repository_url: https://github.com/NoNameProvided/xlsx-republish.git
//! version_list_url: https://cdn.sheetjs.com/xlsx.lst
//! artifact_url_template: https://cdn.sheetjs.com/xlsx-{version}/xlsx-{version}.tgz
//! window_size: 5
//! first_publish: fail
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::MirrorError;

/// Config file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "republish.yaml";

/// Placeholder substituted into the artifact URL template
pub const VERSION_PLACEHOLDER: &str = "{version}";

pub const DEFAULT_SOURCE_PACKAGE: &str = "xlsx";
pub const DEFAULT_TARGET_PACKAGE: &str = "xlsx-republish";
pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/NoNameProvided/xlsx-republish.git";
pub const DEFAULT_VERSION_LIST_URL: &str = "https://cdn.sheetjs.com/xlsx.lst";
pub const DEFAULT_ARTIFACT_URL_TEMPLATE: &str =
    "https://cdn.sheetjs.com/xlsx-{version}/xlsx-{version}.tgz";
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_STAGING_DIR: &str = "./storage/versions";

/// Number of trailing CDN versions considered per run. Several releases may
/// land between two scheduled runs.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// What to do when the target package has never been published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstPublishPolicy {
    /// Abort the run with `BaselineUnavailable`
    #[default]
    Fail,
    /// Treat the baseline as absent and publish the whole window
    PublishWindow,
}

/// Configuration for one mirror run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Package name as published on the CDN
    pub source_package: String,

    /// Name the package is republished under
    pub target_package: String,

    /// Value written to `repository.url` in the republished manifest
    pub repository_url: String,

    /// Newline-delimited, append-only list of versions on the CDN
    pub version_list_url: String,

    /// Tarball URL, with `{version}` substituted per version
    pub artifact_url_template: String,

    /// Registry used for the `latest` lookup
    pub registry_url: String,

    /// Root of the per-version staging tree
    pub staging_dir: PathBuf,

    /// How many trailing CDN versions to consider
    pub window_size: usize,

    /// Whether prerelease versions above the baseline are published
    pub include_prerelease: bool,

    pub first_publish: FirstPublishPolicy,

    /// Package manager binary used for `publish`
    pub npm_bin: String,

    /// Extra arguments appended to the publish command
    pub publish_args: Vec<String>,

    /// Timeout for CDN and registry HTTP requests
    pub http_timeout_seconds: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_package: DEFAULT_SOURCE_PACKAGE.to_string(),
            target_package: DEFAULT_TARGET_PACKAGE.to_string(),
            repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            version_list_url: DEFAULT_VERSION_LIST_URL.to_string(),
            artifact_url_template: DEFAULT_ARTIFACT_URL_TEMPLATE.to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            window_size: DEFAULT_WINDOW_SIZE,
            include_prerelease: false,
            first_publish: FirstPublishPolicy::default(),
            npm_bin: "npm".to_string(),
            publish_args: Vec::new(),
            http_timeout_seconds: 30,
        }
    }
}

impl MirrorConfig {
    /// Load configuration with the standard resolution order
    ///
    /// An explicit path must exist. Without one, `./republish.yaml` is used
    /// when present and the defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    Self::from_file(local)?
                } else {
                    debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to an empty map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content).context("Failed to parse configuration YAML")
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), MirrorError> {
        if self.window_size == 0 {
            return Err(MirrorError::Config(
                "window_size must be at least 1".to_string(),
            ));
        }

        for (field, value) in [
            ("source_package", &self.source_package),
            ("target_package", &self.target_package),
        ] {
            if value.trim().is_empty() {
                return Err(MirrorError::Config(format!("{field} must not be empty")));
            }
        }

        for (field, value) in [
            ("version_list_url", &self.version_list_url),
            ("artifact_url_template", &self.artifact_url_template),
            ("registry_url", &self.registry_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(MirrorError::Config(format!(
                    "{field} must start with http:// or https:// (got: {value})"
                )));
            }
        }

        if !self.artifact_url_template.contains(VERSION_PLACEHOLDER) {
            return Err(MirrorError::Config(format!(
                "artifact_url_template must contain the {VERSION_PLACEHOLDER} placeholder"
            )));
        }

        Ok(())
    }

    /// Tarball URL for a given version
    pub fn artifact_url(&self, version: &semver::Version) -> String {
        self.artifact_url_template
            .replace(VERSION_PLACEHOLDER, &version.to_string())
    }
}

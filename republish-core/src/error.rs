//! Mirror run error types
//!
//! Every failure is fatal to the run. The variants only classify where it
//! happened so the operator can tell a CDN outage from a rejected publish.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the per-version publisher that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Install,
    Rewrite,
    Repack,
    Publish,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStep::Install => "install",
            PublishStep::Rewrite => "rewrite",
            PublishStep::Repack => "repack",
            PublishStep::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Errors raised by a mirror run
#[derive(Error, Debug)]
pub enum MirrorError {
    /// The CDN version list could not be read or held no usable versions
    #[error("CDN version list unavailable at {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    /// The registry lookup for the baseline failed, or no baseline exists
    /// and the first-publish policy forbids continuing
    #[error("Registry baseline unavailable for '{package}': {reason}")]
    BaselineUnavailable { package: String, reason: String },

    /// One of the install/rewrite/repack/publish steps failed for a version
    #[error("[{version}] {step} step failed")]
    PerVersionFailure {
        version: semver::Version,
        step: PublishStep,
        #[source]
        source: anyhow::Error,
    },

    /// Removing the staging tree failed
    #[error("Failed to remove staging directory {path}")]
    CleanupFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MirrorError {
    pub(crate) fn step(version: &semver::Version, step: PublishStep, source: anyhow::Error) -> Self {
        MirrorError::PerVersionFailure {
            version: version.clone(),
            step,
            source,
        }
    }

    /// The version being processed when the error happened, if any
    pub fn version(&self) -> Option<&semver::Version> {
        match self {
            MirrorError::PerVersionFailure { version, .. } => Some(version),
            _ => None,
        }
    }
}

pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

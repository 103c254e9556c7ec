//! Per-version staging directories
//!
//! ```text
//! <root>/
//!   0.18.6/
//!     package/                      ← unpacked, rewritten package
//!     xlsx-republish-0.18.6.tgz     ← repacked archive
//!   0.19.0/
//!     ...
//! ```
//!
//! Entries are only removed by [`Staging::clean`] at the end of a run.

use anyhow::Context;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MirrorError, Result};

/// Directory name of the unpacked package inside a staging entry
pub const PACKAGE_DIR: &str = "package";

/// The staging tree for one run
#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

/// Staging location for exactly one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    version: Version,
    dir: PathBuf,
}

impl Staging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location for a version, without touching the filesystem
    pub fn entry(&self, version: &Version) -> StagingEntry {
        StagingEntry {
            version: version.clone(),
            dir: self.root.join(version.to_string()),
        }
    }

    /// Create an empty directory for a version
    ///
    /// A leftover directory from an earlier aborted run is replaced.
    pub fn prepare(&self, version: &Version) -> anyhow::Result<StagingEntry> {
        let entry = self.entry(version);
        if entry.dir.exists() {
            debug!("Removing stale staging directory {}", entry.dir.display());
            std::fs::remove_dir_all(&entry.dir).with_context(|| {
                format!("Failed to remove stale staging directory: {}", entry.dir.display())
            })?;
        }
        std::fs::create_dir_all(&entry.dir).with_context(|| {
            format!("Failed to create staging directory: {}", entry.dir.display())
        })?;
        Ok(entry)
    }

    /// Remove the whole staging tree. A missing root is not an error.
    pub fn clean(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!("Removed staging directory {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MirrorError::CleanupFailure {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

impl StagingEntry {
    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the unpacked package lives
    pub fn package_dir(&self) -> PathBuf {
        self.dir.join(PACKAGE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_is_named_after_version() {
        let staging = Staging::new("/tmp/staging");
        let entry = staging.entry(&Version::parse("0.19.0-rc.1").unwrap());
        assert_eq!(entry.dir(), Path::new("/tmp/staging/0.19.0-rc.1"));
        assert_eq!(entry.package_dir(), PathBuf::from("/tmp/staging/0.19.0-rc.1/package"));
    }

    #[test]
    fn test_prepare_replaces_stale_directory() {
        let temp_dir = TempDir::new().unwrap();
        let staging = Staging::new(temp_dir.path().join("versions"));
        let version = Version::new(0, 18, 6);

        let entry = staging.prepare(&version).unwrap();
        std::fs::write(entry.dir().join("leftover.tgz"), b"stale").unwrap();

        let entry = staging.prepare(&version).unwrap();
        assert!(entry.dir().is_dir());
        assert!(!entry.dir().join("leftover.tgz").exists());
    }

    #[test]
    fn test_clean_removes_tree() {
        let temp_dir = TempDir::new().unwrap();
        let staging = Staging::new(temp_dir.path().join("versions"));
        staging.prepare(&Version::new(0, 18, 6)).unwrap();
        staging.prepare(&Version::new(0, 19, 0)).unwrap();

        staging.clean().unwrap();
        assert!(!staging.root().exists());
    }

    #[test]
    fn test_clean_missing_root_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let staging = Staging::new(temp_dir.path().join("never-created"));

        staging.clean().unwrap();
        staging.clean().unwrap();
    }
}

//! Staged package handling: unpack, rewrite, repack
//!
//! Archives follow the registry tarball convention: a gzip'd tar with every
//! file under a single `package/` root.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use semver::Version;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, HeaderMode};
use tracing::debug;

use crate::manifest::{PackageManifest, MANIFEST_FILE};
use crate::staging::{StagingEntry, PACKAGE_DIR};

/// Scratch directory used while unpacking, inside the staging entry
const EXTRACT_DIR: &str = ".extract";

/// Filesystem side of the per-version publisher
pub trait Packager: Send + Sync {
    /// Unpack a downloaded tarball into the entry's `package/` directory
    fn install(&self, tarball: &[u8], entry: &StagingEntry) -> Result<PathBuf>;

    /// Rewrite the manifest's name and repository URL in place
    ///
    /// Fails if the manifest's own version differs from `version`.
    fn rewrite(
        &self,
        package_dir: &Path,
        name: &str,
        repository_url: &str,
        version: &Version,
    ) -> Result<()>;

    /// Pack the package directory into an archive inside the entry
    fn pack(
        &self,
        package_dir: &Path,
        entry: &StagingEntry,
        name: &str,
        version: &Version,
    ) -> Result<PathBuf>;
}

/// Archive file name the package manager would produce for a package
///
/// `@scope/name` becomes `scope-name-<version>.tgz`.
pub fn archive_file_name(name: &str, version: &Version) -> String {
    let stem = name.trim_start_matches('@').replace('/', "-");
    format!("{stem}-{version}.tgz")
}

/// Packager built on `flate2` and `tar`
#[derive(Debug, Default, Clone)]
pub struct TarballPackager;

impl TarballPackager {
    pub fn new() -> Self {
        Self
    }

    fn extract_to_dir(&self, bytes: &[u8], dest: &Path) -> Result<()> {
        let gz_decoder = GzDecoder::new(Cursor::new(bytes));
        let mut archive = Archive::new(gz_decoder);
        archive.unpack(dest).context("Failed to extract tarball")?;
        Ok(())
    }

    /// The directory holding the package contents after extraction
    ///
    /// Usually the archive's single root directory, whatever it is named.
    fn package_root(&self, extracted: &Path) -> Result<PathBuf> {
        let entries = std::fs::read_dir(extracted)
            .with_context(|| format!("Failed to read {}", extracted.display()))?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()
            .with_context(|| format!("Failed to list {}", extracted.display()))?;

        match entries.as_slice() {
            [only] if only.is_dir() => Ok(only.clone()),
            _ => Ok(extracted.to_path_buf()),
        }
    }
}

impl Packager for TarballPackager {
    fn install(&self, tarball: &[u8], entry: &StagingEntry) -> Result<PathBuf> {
        let extract_dir = entry.dir().join(EXTRACT_DIR);
        std::fs::create_dir_all(&extract_dir)?;
        self.extract_to_dir(tarball, &extract_dir)?;

        let root = self.package_root(&extract_dir)?;
        if !root.join(MANIFEST_FILE).is_file() {
            anyhow::bail!(
                "Installation failed: {} not found in archive for {}",
                MANIFEST_FILE,
                entry.version()
            );
        }

        let package_dir = entry.package_dir();
        std::fs::rename(&root, &package_dir).with_context(|| {
            format!(
                "Failed to move {} to {}",
                root.display(),
                package_dir.display()
            )
        })?;
        if extract_dir.exists() {
            std::fs::remove_dir_all(&extract_dir)?;
        }

        debug!("Unpacked {} into {}", entry.version(), package_dir.display());
        Ok(package_dir)
    }

    fn rewrite(
        &self,
        package_dir: &Path,
        name: &str,
        repository_url: &str,
        version: &Version,
    ) -> Result<()> {
        let mut manifest = PackageManifest::load(package_dir)?;

        let manifest_version = manifest.version()?;
        if manifest_version != *version {
            anyhow::bail!(
                "Manifest version {} does not match requested version {}",
                manifest_version,
                version
            );
        }

        manifest.rewrite(name, repository_url);
        manifest.save(package_dir)
    }

    fn pack(
        &self,
        package_dir: &Path,
        entry: &StagingEntry,
        name: &str,
        version: &Version,
    ) -> Result<PathBuf> {
        let archive_path = entry.dir().join(archive_file_name(name, version));

        let archive_file = std::fs::File::create(&archive_path)
            .with_context(|| format!("Failed to create {}", archive_path.display()))?;

        let encoder = GzEncoder::new(archive_file, Compression::default());
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);

        builder
            .append_dir_all(PACKAGE_DIR, package_dir)
            .context("Failed to add files to tarball")?;

        let encoder = builder.into_inner().context("Failed to finalize tarball")?;
        encoder.finish().context("Failed to compress tarball")?;

        debug!("Packed {}", archive_path.display());
        Ok(archive_path)
    }
}

//! Version window parsing
//!
//! The CDN publishes an append-only, newline-delimited list of versions in
//! ascending publish order. Only the trailing `k` entries are considered.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// The most recent versions known to the CDN, in the CDN's own order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionWindow(Vec<Version>);

impl VersionWindow {
    /// Build a window from already-parsed versions, dropping repeats
    pub fn new(versions: impl IntoIterator<Item = Version>) -> Self {
        let mut unique: Vec<Version> = Vec::new();
        for version in versions {
            if !unique.contains(&version) {
                unique.push(version);
            }
        }
        Self(unique)
    }

    pub fn versions(&self) -> &[Version] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.0.contains(version)
    }
}

impl fmt::Display for VersionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_versions(&self.0))
    }
}

/// Parse the trailing `k` non-blank lines of a CDN version list
///
/// Lines that are not valid semver are skipped with a warning. The result
/// may be empty; callers decide whether that is an error.
pub fn parse_version_list(text: &str, k: usize) -> VersionWindow {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let start = lines.len().saturating_sub(k);

    VersionWindow::new(lines[start..].iter().filter_map(|line| {
        match Version::parse(line.trim_start_matches('v')) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Skipping invalid version '{}' in CDN list: {}", line, e);
                None
            }
        }
    }))
}

/// Comma-join versions for log output
pub fn join_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(Version::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

//! Publish-set resolution
//!
//! Picks the CDN versions that are strictly newer than the registry's
//! `latest` tag. Versions below the window are never republished.

use semver::Version;
use tracing::{debug, info};

use crate::config::FirstPublishPolicy;
use crate::error::{MirrorError, Result};
use crate::version::VersionWindow;

/// Inputs that shape resolution besides the versions themselves
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    pub include_prerelease: bool,
    pub first_publish: FirstPublishPolicy,
}

/// Versions from the window strictly above the baseline, ascending
///
/// `package` is only used to label a missing-baseline error.
pub fn resolve_publish_set(
    package: &str,
    window: &VersionWindow,
    baseline: Option<&Version>,
    options: ResolveOptions,
) -> Result<Vec<Version>> {
    if baseline.is_none() && options.first_publish == FirstPublishPolicy::Fail {
        return Err(MirrorError::BaselineUnavailable {
            package: package.to_string(),
            reason: "package has never been published and first_publish is 'fail'".to_string(),
        });
    }

    let mut publish_set: Vec<Version> = window
        .iter()
        .filter(|version| prerelease_allowed(version, baseline, options.include_prerelease))
        .filter(|version| baseline.map_or(true, |base| precedence(version) > precedence(base)))
        .cloned()
        .collect();

    // `Ord` on Version also compares build metadata; precedence does not
    publish_set.sort();
    publish_set.dedup_by(|a, b| precedence(a) == precedence(b));

    match baseline {
        Some(base) => debug!(
            "Resolved {} of {} candidates above baseline {}",
            publish_set.len(),
            window.len(),
            base
        ),
        None => info!(
            "No registry baseline, publishing all {} eligible candidates",
            publish_set.len()
        ),
    }

    Ok(publish_set)
}

/// Range-style prerelease rule for `>baseline`
///
/// A prerelease only matches when prereleases are enabled, or when the
/// baseline is itself a prerelease of the same `major.minor.patch`.
fn prerelease_allowed(version: &Version, baseline: Option<&Version>, include: bool) -> bool {
    if include || version.pre.is_empty() {
        return true;
    }
    baseline.is_some_and(|base| {
        !base.pre.is_empty()
            && (base.major, base.minor, base.patch) == (version.major, version.minor, version.patch)
    })
}

/// Semver precedence key: build metadata is ignored
fn precedence(version: &Version) -> (u64, u64, u64, &semver::Prerelease) {
    (version.major, version.minor, version.patch, &version.pre)
}

//! republish - mirror CDN-hosted package versions onto a package registry
//!
//! One run reads the CDN's recent versions, compares them with the
//! registry's `latest` tag, and republishes every newer version under a
//! different name with a rewritten manifest.
//!
//! The network and filesystem side effects sit behind three seams so the
//! resolution logic can be exercised without real tooling:
//!
//! - [`cdn::CdnClient`]: version list and tarball downloads
//! - [`registry::RegistryClient`]: `latest` lookup and publishing
//! - [`packager::Packager`]: unpack, manifest rewrite, repack

pub mod cdn;
pub mod config;
pub mod error;
pub mod manifest;
pub mod packager;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod staging;
pub mod version;

pub use config::{FirstPublishPolicy, MirrorConfig};
pub use error::{MirrorError, PublishStep};
pub use pipeline::{Pipeline, RunOptions, RunReport};

//! Package manifest (`package.json`) rewriting
//!
//! The manifest is held as an order-preserving JSON document so that only the
//! rewritten fields differ from the upstream file.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Manifest file name inside a package directory
pub const MANIFEST_FILE: &str = "package.json";

/// A package manifest
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    document: Map<String, Value>,
}

impl PackageManifest {
    /// Load the manifest from a package directory
    pub fn load(package_dir: &Path) -> Result<Self> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(content).context("Manifest is not valid JSON")? {
            Value::Object(document) => Ok(Self { document }),
            _ => anyhow::bail!("Manifest must be a JSON object"),
        }
    }

    /// Write the manifest back into a package directory
    pub fn save(&self, package_dir: &Path) -> Result<()> {
        let path = package_dir.join(MANIFEST_FILE);
        let mut content =
            serde_json::to_string_pretty(&self.document).context("Failed to serialize manifest")?;
        content.push('\n');
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))
    }

    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    /// The manifest's version, parsed as semver
    pub fn version(&self) -> Result<semver::Version> {
        let raw = self
            .document
            .get("version")
            .and_then(Value::as_str)
            .context("Manifest has no version field")?;
        semver::Version::parse(raw)
            .with_context(|| format!("Manifest version '{raw}' is not valid semver"))
    }

    /// The repository URL, whether given as an object or a shorthand string
    pub fn repository_url(&self) -> Option<&str> {
        match self.document.get("repository")? {
            Value::String(url) => Some(url),
            Value::Object(repo) => repo.get("url").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Point the manifest at the mirror: new name and repository URL
    ///
    /// An object `repository` keeps its other keys. A shorthand string or a
    /// missing `repository` becomes `{"type": "git", "url": ...}`.
    pub fn rewrite(&mut self, name: &str, repository_url: &str) {
        self.document
            .insert("name".to_string(), Value::String(name.to_string()));

        match self.document.get_mut("repository") {
            Some(Value::Object(repo)) => {
                repo.insert("url".to_string(), Value::String(repository_url.to_string()));
            }
            _ => {
                let mut repo = Map::new();
                repo.insert("type".to_string(), Value::String("git".to_string()));
                repo.insert("url".to_string(), Value::String(repository_url.to_string()));
                self.document
                    .insert("repository".to_string(), Value::Object(repo));
            }
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.document.clone())
    }
}

//! Shared helpers for pipeline integration tests
//!
//! In-memory stand-ins for the CDN and the registry. Both record every call
//! so tests can assert on ordering and on what never happened.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use republish_core::cdn::CdnClient;
use republish_core::error::{MirrorError, PublishStep, Result};
use republish_core::registry::RegistryClient;
use republish_core::version::{parse_version_list, VersionWindow};
use semver::Version;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// Upstream manifest as the CDN ships it
pub fn upstream_manifest(version: &str) -> String {
    format!(
        r#"{{
  "name": "xlsx",
  "version": "{version}",
  "author": "sheetjs",
  "description": "SheetJS Spreadsheet data parser and writer",
  "keywords": ["excel", "xls", "xlsx"],
  "main": "xlsx.js",
  "repository": {{
    "type": "git",
    "url": "https://git.sheetjs.com/SheetJS/sheetjs"
  }},
  "license": "Apache-2.0"
}}"#
    )
}

/// Build a registry-style tarball for one upstream version
pub fn upstream_tarball(version: &str) -> Vec<u8> {
    let temp_dir = TempDir::new().unwrap();
    let package_dir = temp_dir.path().join("package");
    std::fs::create_dir_all(&package_dir).unwrap();
    std::fs::write(package_dir.join("package.json"), upstream_manifest(version)).unwrap();
    std::fs::write(
        package_dir.join("xlsx.js"),
        format!("module.exports.version = '{version}';\n"),
    )
    .unwrap();

    let mut bytes = Vec::new();
    {
        let encoder = GzEncoder::new(&mut bytes, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all("package", &package_dir).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }
    bytes
}

/// Read `package/package.json` out of a packed archive
pub fn read_archive_manifest(archive: &Path) -> serde_json::Value {
    let file = std::fs::File::open(archive).unwrap();
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    for item in tar.entries().unwrap() {
        let mut item = item.unwrap();
        if item.path().unwrap() == Path::new("package/package.json") {
            let mut content = String::new();
            item.read_to_string(&mut content).unwrap();
            return serde_json::from_str(&content).unwrap();
        }
    }
    panic!("no package/package.json in {}", archive.display());
}

/// CDN serving a fixed version list and generated tarballs
#[derive(Clone)]
pub struct MockCdn {
    list: String,
    missing: HashSet<Version>,
    pub downloads: Arc<Mutex<Vec<Version>>>,
}

impl MockCdn {
    pub fn new(versions: &[&str]) -> Self {
        Self {
            list: versions.iter().map(|s| format!("{s}\n")).collect(),
            missing: HashSet::new(),
            downloads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the artifact download for `version` fail
    pub fn without_artifact(mut self, version: &str) -> Self {
        self.missing.insert(v(version));
        self
    }

    pub fn downloads(&self) -> Vec<Version> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl CdnClient for MockCdn {
    async fn fetch_version_window(&self, k: usize) -> Result<VersionWindow> {
        let window = parse_version_list(&self.list, k);
        if window.is_empty() {
            return Err(MirrorError::SourceUnavailable {
                url: "mock://cdn/versions.lst".to_string(),
                reason: "version list contains no valid versions".to_string(),
            });
        }
        Ok(window)
    }

    async fn download_artifact(&self, version: &Version) -> Result<Bytes> {
        self.downloads.lock().unwrap().push(version.clone());
        if self.missing.contains(version) {
            return Err(MirrorError::PerVersionFailure {
                version: version.clone(),
                step: PublishStep::Install,
                source: anyhow::anyhow!("Download failed: HTTP 404"),
            });
        }
        Ok(Bytes::from(upstream_tarball(&version.to_string())))
    }
}

/// One recorded publish call
#[derive(Debug, Clone)]
pub struct PublishCall {
    pub version: Version,
    pub archive: PathBuf,
    pub manifest: serde_json::Value,
}

/// Registry with a fixed baseline that records publishes
#[derive(Clone)]
pub struct MockRegistry {
    baseline: Option<Version>,
    reject: HashMap<Version, String>,
    pub lookups: Arc<Mutex<Vec<String>>>,
    pub published: Arc<Mutex<Vec<PublishCall>>>,
}

impl MockRegistry {
    pub fn with_baseline(baseline: &str) -> Self {
        Self::new(Some(v(baseline)))
    }

    pub fn never_published() -> Self {
        Self::new(None)
    }

    fn new(baseline: Option<Version>) -> Self {
        Self {
            baseline,
            reject: HashMap::new(),
            lookups: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reject publishing `version` the way a registry rejects duplicates
    pub fn rejecting(mut self, version: &str) -> Self {
        self.reject.insert(
            v(version),
            "npm ERR! code EPUBLISHCONFLICT cannot publish over existing version".to_string(),
        );
        self
    }

    pub fn published_versions(&self) -> Vec<Version> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.version.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn latest_version(&self, package: &str) -> Result<Option<Version>> {
        self.lookups.lock().unwrap().push(package.to_string());
        Ok(self.baseline.clone())
    }

    async fn publish(&self, archive: &Path, version: &Version) -> Result<()> {
        if let Some(reason) = self.reject.get(version) {
            return Err(MirrorError::PerVersionFailure {
                version: version.clone(),
                step: PublishStep::Publish,
                source: anyhow::anyhow!("{reason}"),
            });
        }

        // The archive must exist at publish time; read it before cleanup
        let manifest = read_archive_manifest(archive);
        self.published.lock().unwrap().push(PublishCall {
            version: version.clone(),
            archive: archive.to_path_buf(),
            manifest,
        });
        Ok(())
    }
}

/// HTTP server on 127.0.0.1 answering every request with one fixed response
pub struct CannedServer {
    pub url: String,
    /// Request lines received, e.g. `GET /xlsx-republish/latest HTTP/1.1`
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let response = format!(
            "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let seen = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                if let Some(line) = head.lines().next() {
                    seen.lock().unwrap().push(line.to_string());
                }
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

//! Remote artifact backends
//!
//! Provides a trait for remote artifact stores that can be implemented by
//! different transports (a second filesystem root, an HTTP artifact
//! repository). Artifacts live at
//! `{namespace}/{name}/{version}/{runtime}/{name}.cp`.

mod factory;
mod filesystem;
mod http;

pub use factory::{create_backend, CacheKind};
pub use filesystem::FilesystemBackend;
pub use http::HttpBackend;

use crate::error::{CoonError, CoonResult};
use crate::package::{artifact_file_name, version_segment, Package};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Namespace used when neither the caller, the backend nor the package provides one
pub const FALLBACK_NAMESPACE: &str = "_";

/// File listing the published versions of a package
pub const VERSION_INDEX: &str = "versions.json";

/// Abstract remote artifact store
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Configured name of this backend
    fn name(&self) -> &str;

    /// Backend flavor
    fn kind(&self) -> CacheKind;

    /// Account the backend authenticates as, the default publish namespace
    fn account(&self) -> Option<&str>;

    /// Whether an artifact for `pack` exists under the current runtime
    async fn exists(&self, pack: &Package) -> CoonResult<bool>;

    /// Published versions of `qualified` (`namespace/name`) in publish order
    async fn versions(&self, qualified: &str) -> CoonResult<Vec<String>>;

    /// Download the artifact for `pack` into `dest`
    async fn fetch_package(&self, pack: &Package, dest: &Path) -> CoonResult<()>;

    /// Upload `artifact` for `pack`.
    ///
    /// `namespace` overrides the account namespace. Returns `false` when the
    /// backend refused the upload.
    async fn add_package(
        &self,
        pack: &Package,
        artifact: &Path,
        namespace: Option<&str>,
        is_public: bool,
    ) -> CoonResult<bool>;
}

/// One published version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub version: String,
    pub published_at: DateTime<Utc>,
}

/// Publish-ordered list of versions kept next to a package's version directories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionIndex {
    pub versions: Vec<PublishedVersion>,
}

impl VersionIndex {
    /// Parse an index, treating empty input as an empty index
    pub fn parse(content: &[u8]) -> CoonResult<Self> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(content)?)
    }

    pub fn to_json(&self) -> CoonResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Record `version`; republishing keeps its original position.
    ///
    /// Returns whether the index changed.
    pub fn record(&mut self, version: &str) -> bool {
        if self.versions.iter().any(|v| v.version == version) {
            return false;
        }
        self.versions.push(PublishedVersion {
            version: version.to_string(),
            published_at: Utc::now(),
        });
        true
    }

    /// Version strings in publish order
    pub fn names(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.version.clone()).collect()
    }
}

/// Namespaces to probe when looking `pack` up: its own, then the account
pub(crate) fn lookup_namespaces(pack: &Package, account: Option<&str>) -> Vec<String> {
    let mut namespaces = Vec::new();
    if let Some(ns) = &pack.namespace {
        namespaces.push(ns.clone());
    }
    if let Some(account) = account {
        if !namespaces.iter().any(|ns| ns == account) {
            namespaces.push(account.to_string());
        }
    }
    if namespaces.is_empty() {
        namespaces.push(FALLBACK_NAMESPACE.to_string());
    }
    namespaces
}

/// Namespace to publish `pack` under
pub(crate) fn publish_namespace(
    pack: &Package,
    explicit: Option<&str>,
    account: Option<&str>,
) -> String {
    explicit
        .or(account)
        .map(str::to_string)
        .or_else(|| pack.namespace.clone())
        .unwrap_or_else(|| FALLBACK_NAMESPACE.to_string())
}

/// `{namespace}/{name}/{version}/{runtime}`
pub(crate) fn version_dir(namespace: &str, pack: &Package, runtime: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        namespace,
        pack.name,
        version_segment(&pack.version),
        runtime
    )
}

/// `{namespace}/{name}/{version}/{runtime}/{name}.cp`
pub(crate) fn artifact_location(namespace: &str, pack: &Package, runtime: &str) -> String {
    format!(
        "{}/{}",
        version_dir(namespace, pack, runtime),
        artifact_file_name(&pack.name)
    )
}

/// Reject qualified names that would escape the backend root
pub(crate) fn validate_qualified(qualified: &str) -> CoonResult<()> {
    let valid = !qualified.is_empty()
        && qualified
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if valid {
        Ok(())
    } else {
        Err(CoonError::User(format!(
            "invalid package name '{}': expected namespace/name",
            qualified
        )))
    }
}

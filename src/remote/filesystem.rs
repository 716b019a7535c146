//! Filesystem remote backend
//!
//! Same layout as an HTTP repository, rooted in a second filesystem tree.
//! Useful as a shared network mount or as a local multi-stage cache.

use crate::error::{CoonError, CoonResult};
use crate::remote::{
    artifact_location, lookup_namespaces, publish_namespace, validate_qualified, CacheKind,
    RemoteBackend, VersionIndex, VERSION_INDEX,
};
use crate::package::Package;
use crate::store::write_atomic;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Remote backend over a filesystem root
pub struct FilesystemBackend {
    name: String,
    root: PathBuf,
    runtime: String,
    namespace: Option<String>,
    index_lock: tokio::sync::Mutex<()>,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        runtime: impl Into<String>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            runtime: runtime.into(),
            namespace,
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn unavailable(&self, context: &str, e: std::io::Error) -> CoonError {
        CoonError::backend_unavailable(&self.name, format!("{}: {}", context, e))
    }

    /// Root must exist; a missing mount is an unavailable backend, not an empty one
    async fn ensure_root(&self) -> CoonResult<()> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(CoonError::backend_unavailable(
                &self.name,
                format!("{} is not a directory", self.root.display()),
            )),
            Err(e) => Err(self.unavailable(&self.root.display().to_string(), e)),
        }
    }

    /// First existing artifact path for `pack`
    async fn locate(&self, pack: &Package) -> CoonResult<Option<PathBuf>> {
        self.ensure_root().await?;
        for namespace in lookup_namespaces(pack, self.account()) {
            let path = self
                .root
                .join(artifact_location(&namespace, pack, &self.runtime));
            if fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    async fn read_index(&self, path: &Path) -> CoonResult<VersionIndex> {
        match fs::read(path).await {
            Ok(content) => VersionIndex::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VersionIndex::default()),
            Err(e) => Err(self.unavailable("reading version index", e)),
        }
    }
}

#[async_trait]
impl RemoteBackend for FilesystemBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CacheKind {
        CacheKind::FilesystemRemote
    }

    fn account(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    async fn exists(&self, pack: &Package) -> CoonResult<bool> {
        Ok(self.locate(pack).await?.is_some())
    }

    async fn versions(&self, qualified: &str) -> CoonResult<Vec<String>> {
        validate_qualified(qualified)?;
        self.ensure_root().await?;
        let index = self
            .read_index(&self.root.join(qualified).join(VERSION_INDEX))
            .await?;
        Ok(index.names())
    }

    async fn fetch_package(&self, pack: &Package, dest: &Path) -> CoonResult<()> {
        let source = self.locate(pack).await?.ok_or_else(|| {
            CoonError::CacheMiss(format!("{}@{} in {}", pack.qualified_name(), pack.version, self.name))
        })?;
        let payload = fs::read(&source)
            .await
            .map_err(|e| self.unavailable(&format!("reading {}", source.display()), e))?;
        write_atomic(dest, &payload)
            .await
            .map_err(|e| CoonError::io(format!("writing {}", dest.display()), e))?;
        debug!("Fetched {} from {}", source.display(), self.name);
        Ok(())
    }

    async fn add_package(
        &self,
        pack: &Package,
        artifact: &Path,
        namespace: Option<&str>,
        _is_public: bool,
    ) -> CoonResult<bool> {
        self.ensure_root().await?;
        let payload = fs::read(artifact)
            .await
            .map_err(|e| CoonError::io(format!("reading artifact {}", artifact.display()), e))?;

        let namespace = publish_namespace(pack, namespace, self.account());
        let dest = self
            .root
            .join(artifact_location(&namespace, pack, &self.runtime));
        write_atomic(&dest, &payload)
            .await
            .map_err(|e| self.unavailable(&format!("writing {}", dest.display()), e))?;

        let _guard = self.index_lock.lock().await;
        let index_path = self.root.join(&namespace).join(&pack.name).join(VERSION_INDEX);
        let mut index = self.read_index(&index_path).await?;
        if index.record(&pack.version) {
            write_atomic(&index_path, &index.to_json()?)
                .await
                .map_err(|e| self.unavailable("writing version index", e))?;
        }

        info!("Uploaded {} to {}", dest.display(), self.name);
        Ok(true)
    }
}

//! Cache manager
//!
//! Mediates every artifact read and write. The local store is always
//! consulted first; remote backends follow in configuration order.
//!
//! # Lookup
//!
//! | Step | Source | On hit |
//! |------|--------|--------|
//! | 1 | Local store | use directly |
//! | 2 | Remote backends, first hit in declaration order | download, write through to the local store |
//! | 3 | Source build | package, store locally |
//!
//! Backend failures never cross this boundary: they are logged and treated
//! as a miss (or a failed upload).

use crate::config::Config;
use crate::error::{CoonError, CoonResult};
use crate::package::packager::read_manifest;
use crate::package::{artifact_file_name, Package};
use crate::project::ProjectConfig;
use crate::remote::{create_backend, RemoteBackend};
use crate::store::LocalStore;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builds a package from source when no cache holds it
#[async_trait]
pub trait SourceBuilder: Send + Sync {
    /// Fetch, build and package `pack`, returning the artifact bytes
    async fn build_from_source(&self, pack: &Package) -> CoonResult<Vec<u8>>;
}

/// Local store plus ordered, named remote backends
pub struct CacheManager {
    store: Arc<LocalStore>,
    runtime: String,
    temp_dir: PathBuf,
    timeout: Duration,
    backends: Vec<Box<dyn RemoteBackend>>,
}

impl CacheManager {
    /// Wire the caches described by `config`.
    ///
    /// Remote entries that cannot be created are skipped with a warning.
    pub fn new(config: &Config, runtime: &str) -> Self {
        let timeout = Duration::from_secs(config.backend_timeout_secs.max(1));
        let mut backends = Vec::new();
        for spec in config.remote_caches() {
            match create_backend(spec, runtime, timeout) {
                Ok(Some(backend)) => {
                    debug!("Configured {} cache {}", backend.kind(), backend.name());
                    backends.push(backend);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping cache {}: {}", spec.name, e),
            }
        }

        Self::with_backends(
            Arc::new(LocalStore::new(config.local_cache_root())),
            runtime,
            config.temp_dir.clone(),
            timeout,
            backends,
        )
    }

    /// Assemble a manager from explicit parts
    pub fn with_backends(
        store: Arc<LocalStore>,
        runtime: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
        timeout: Duration,
        backends: Vec<Box<dyn RemoteBackend>>,
    ) -> Self {
        Self {
            store,
            runtime: runtime.into(),
            temp_dir: temp_dir.into(),
            timeout,
            backends,
        }
    }

    /// The local store
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Runtime identity used for every artifact key
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Names of the configured remote backends, in lookup order
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    fn backend(&self, name: &str) -> Option<&dyn RemoteBackend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
    }

    /// Run one backend call under the timeout; failures become `None`
    async fn guarded<T>(
        &self,
        backend: &str,
        what: &str,
        call: impl Future<Output = CoonResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} on {} failed: {}", what, backend, e);
                None
            }
            Err(_) => {
                warn!("{} on {} timed out after {:?}", what, backend, self.timeout);
                None
            }
        }
    }

    /// Whether the local store holds `pack` for the current runtime
    pub fn exists_local(&self, pack: &Package) -> bool {
        self.store.exists(&pack.identity(&self.runtime))
    }

    /// Whether the named backend holds `pack`; never fails
    pub async fn exists_remote(&self, backend_name: &str, pack: &Package) -> bool {
        let Some(backend) = self.backend(backend_name) else {
            warn!("{}", CoonError::BackendNotFound(backend_name.to_string()));
            return false;
        };
        self.guarded(backend.name(), "exists", backend.exists(pack))
            .await
            .unwrap_or(false)
    }

    /// Read `pack` from the local store
    pub async fn get_local(&self, pack: &Package) -> CoonResult<Vec<u8>> {
        self.store.get(&pack.identity(&self.runtime)).await
    }

    /// Install downloaded or freshly built artifact bytes into the local store
    pub async fn add_fetched(&self, pack: &Package, payload: &[u8]) -> CoonResult<PathBuf> {
        self.store.put(&pack.identity(&self.runtime), payload).await
    }

    /// Look `pack` up in the remote backends and write it through on a hit.
    ///
    /// Every backend is asked concurrently; the first hit in declaration
    /// order is downloaded. Returns `None` when no backend has the artifact.
    pub async fn fetch_remote(&self, pack: &Package) -> CoonResult<Option<Vec<u8>>> {
        if self.backends.is_empty() {
            return Ok(None);
        }

        let lookups = self
            .backends
            .iter()
            .map(|b| self.guarded(b.name(), "exists", b.exists(pack)));
        let hits = join_all(lookups).await;

        let dest = self.temp_dir.join(artifact_file_name(&pack.name));
        for (backend, hit) in self.backends.iter().zip(hits) {
            if hit != Some(true) {
                continue;
            }
            let downloaded = self
                .guarded(backend.name(), "fetch", backend.fetch_package(pack, &dest))
                .await;
            if downloaded.is_none() {
                continue;
            }

            let payload = tokio::fs::read(&dest)
                .await
                .map_err(|e| CoonError::io(format!("reading {}", dest.display()), e))?;
            let _ = tokio::fs::remove_file(&dest).await;

            self.add_fetched(pack, &payload).await?;
            info!(
                "Fetched {}@{} from {}",
                pack.qualified_name(),
                pack.version,
                backend.name()
            );
            return Ok(Some(payload));
        }

        debug!("{}@{} not found remotely", pack.qualified_name(), pack.version);
        Ok(None)
    }

    /// Make `pack` and everything it depends on available locally.
    ///
    /// Each package comes from the local store, a remote backend or a source
    /// build, in that order. Dependencies are read from each artifact's
    /// embedded manifest, so a remote hit for a package does not require its
    /// dependencies to be remote as well.
    pub async fn resolve_or_fetch(
        &self,
        pack: &Package,
        builder: &dyn SourceBuilder,
    ) -> CoonResult<Vec<Package>> {
        let mut queue = VecDeque::from([pack.clone()]);
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.name.clone()) {
                continue;
            }

            let payload = if self.exists_local(&current) {
                debug!("{}@{} found locally", current.name, current.version);
                self.get_local(&current).await?
            } else if let Some(payload) = self.fetch_remote(&current).await? {
                payload
            } else {
                info!("Building {}@{} from source", current.name, current.version);
                let payload = builder.build_from_source(&current).await?;
                self.add_fetched(&current, &payload).await?;
                payload
            };

            match read_manifest(&payload) {
                Ok(manifest) => {
                    for (name, coordinate) in manifest.dependencies() {
                        queue.push_back(Package::from_dep(name, coordinate));
                    }
                }
                Err(e) => warn!("Cannot read dependencies of {}: {}", current.name, e),
            }
            resolved.push(current);
        }

        Ok(resolved)
    }

    /// Upload `pack` to the named backend.
    ///
    /// `with_deps` also uploads the direct dependencies, `recursive` the
    /// whole transitive closure found in the local store. Dependency
    /// failures are logged and do not abort; the result reflects `pack`
    /// only.
    pub async fn add_package(
        &self,
        pack: &Package,
        backend_name: &str,
        recursive: bool,
        with_deps: bool,
    ) -> bool {
        let Some(backend) = self.backend(backend_name) else {
            warn!("{}", CoonError::BackendNotFound(backend_name.to_string()));
            return false;
        };

        let uploaded = self.upload(backend, pack).await;

        if recursive || with_deps {
            let mut failed = Vec::new();
            for dep in self.dependency_closure(pack, recursive).await {
                if !self.upload(backend, &dep).await {
                    failed.push(format!("{}@{}", dep.name, dep.version));
                }
            }
            if !failed.is_empty() {
                warn!(
                    "Failed to publish dependencies to {}: {}",
                    backend.name(),
                    failed.join(", ")
                );
            }
        }

        uploaded
    }

    /// Published versions of `qualified` on the named backend, empty on failure
    pub async fn versions(&self, backend_name: &str, qualified: &str) -> Vec<String> {
        let Some(backend) = self.backend(backend_name) else {
            warn!("{}", CoonError::BackendNotFound(backend_name.to_string()));
            return Vec::new();
        };
        self.guarded(backend.name(), "versions", backend.versions(qualified))
            .await
            .unwrap_or_default()
    }

    async fn upload(&self, backend: &dyn RemoteBackend, pack: &Package) -> bool {
        let artifact = match pack.artifact_path().filter(|p| p.is_file()) {
            Some(path) => path,
            None => {
                let path = self.store.path_of(&pack.identity(&self.runtime));
                if !path.is_file() {
                    warn!(
                        "No artifact for {}@{}, package it first",
                        pack.name, pack.version
                    );
                    return false;
                }
                path
            }
        };

        self.guarded(
            backend.name(),
            "upload",
            backend.add_package(pack, &artifact, None, true),
        )
        .await
        .unwrap_or(false)
    }

    /// Dependencies of `pack` known from its declaration and the local store
    async fn dependency_closure(&self, pack: &Package, transitive: bool) -> Vec<Package> {
        let mut queue: VecDeque<Package> = self.declared_deps(pack).await.into();
        let mut seen: HashSet<String> = HashSet::from([pack.name.clone()]);
        let mut closure = Vec::new();

        while let Some(dep) = queue.pop_front() {
            if !seen.insert(dep.name.clone()) {
                continue;
            }
            if transitive {
                queue.extend(self.declared_deps(&dep).await);
            }
            closure.push(dep);
        }
        closure
    }

    async fn declared_deps(&self, pack: &Package) -> Vec<Package> {
        if !pack.declared.is_empty() {
            return pack.declared_packages();
        }
        match self.get_local(pack).await {
            Ok(payload) => match read_manifest(&payload) {
                Ok(manifest) => manifest
                    .dependencies()
                    .into_iter()
                    .map(|(name, coordinate)| Package::from_dep(name, coordinate))
                    .collect(),
                Err(_) => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }
}

//! Build tool provisioning
//!
//! Makes the executable a compiler needs available to a project. Sources in
//! priority order:
//!
//! 1. the system search path, used as is
//! 2. a copy already in the project root, used as is
//! 3. the local store's tool namespace, linked into the project
//! 4. a download, stored in the local store and linked into the project

pub mod download;
pub mod link;

pub use download::{Downloader, HttpDownloader};
pub use link::link_if_needed;

use crate::compiler::ToolSpec;
use crate::error::{CoonError, CoonResult};
use crate::store::LocalStore;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Where a provisioned tool came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    System,
    Project,
    Cache,
    Downloaded,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system path",
            Self::Project => "project",
            Self::Cache => "local cache",
            Self::Downloaded => "download",
        };
        write!(f, "{}", name)
    }
}

/// A tool ready to invoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedTool {
    pub name: String,
    /// Executable to invoke
    pub path: PathBuf,
    pub provenance: Provenance,
}

/// Locates, caches and links build tools
pub struct ToolProvisioner {
    store: Arc<LocalStore>,
    temp_dir: PathBuf,
    sources: HashMap<String, String>,
    search_path: Option<OsString>,
    downloader: Box<dyn Downloader>,
}

impl ToolProvisioner {
    pub fn new(
        store: Arc<LocalStore>,
        temp_dir: impl Into<PathBuf>,
        downloader: Box<dyn Downloader>,
    ) -> Self {
        Self {
            store,
            temp_dir: temp_dir.into(),
            sources: HashMap::new(),
            search_path: None,
            downloader,
        }
    }

    /// Download URL overrides by tool name
    pub fn with_sources(mut self, sources: HashMap<String, String>) -> Self {
        self.sources = sources;
        self
    }

    /// Search these directories instead of `PATH`
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    fn on_search_path(&self, name: &str, cwd: &Path) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which::which_in(name, Some(paths), cwd),
            None => which::which(name),
        };
        found.ok()
    }

    /// Make `tool` available for the project at `project_dir`
    pub async fn ensure(&self, tool: &ToolSpec, project_dir: &Path) -> CoonResult<ProvisionedTool> {
        let name = tool.name.as_str();
        let provisioned = |path: PathBuf, provenance| {
            debug!("Using {} from {}", name, provenance);
            Ok(ProvisionedTool {
                name: name.to_string(),
                path,
                provenance,
            })
        };

        if let Some(path) = self.on_search_path(name, project_dir) {
            return provisioned(path, Provenance::System);
        }

        // An alias is revalidated against the store below
        let local = project_dir.join(name);
        if let Ok(meta) = fs::symlink_metadata(&local).await {
            if meta.is_file() {
                return provisioned(local, Provenance::Project);
            }
        }

        if self.store.tool_exists(name) {
            link_if_needed(&self.store.tool_path(name), &local)?;
            return provisioned(local, Provenance::Cache);
        }

        let url = self
            .sources
            .get(name)
            .map(String::as_str)
            .or(tool.url.as_deref())
            .ok_or_else(|| {
                CoonError::tool(name, "not found on the search path and no download source")
            })?;

        let scratch = self
            .temp_dir
            .join(format!("{}.{}.download", name, uuid::Uuid::new_v4()));
        self.downloader.download(name, url, &scratch).await?;
        let payload = fs::read(&scratch)
            .await
            .map_err(|e| CoonError::io(format!("reading {}", scratch.display()), e))?;
        let _ = fs::remove_file(&scratch).await;

        let cached = self.store.put_tool(name, &payload).await?;
        link_if_needed(&cached, &local)?;
        info!("Provisioned {} into {}", name, project_dir.display());
        provisioned(local, Provenance::Downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubDownloader {
        urls: Arc<Mutex<Vec<String>>>,
        dests: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl Downloader for StubDownloader {
        async fn download(&self, _tool: &str, url: &str, dest: &Path) -> CoonResult<()> {
            self.urls.lock().unwrap().push(url.to_string());
            self.dests.lock().unwrap().push(dest.to_path_buf());
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(dest, b"#!/bin/sh\necho downloaded\n").unwrap();
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        store: Arc<LocalStore>,
        urls: Arc<Mutex<Vec<String>>>,
        dests: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("bin")).unwrap();
            std::fs::create_dir_all(temp.path().join("project")).unwrap();
            let store = Arc::new(LocalStore::new(temp.path().join("cache")));
            Self {
                temp,
                store,
                urls: Arc::new(Mutex::new(Vec::new())),
                dests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn provisioner(&self) -> ToolProvisioner {
            ToolProvisioner::new(
                Arc::clone(&self.store),
                self.temp.path().join("tmp"),
                Box::new(StubDownloader {
                    urls: Arc::clone(&self.urls),
                    dests: Arc::clone(&self.dests),
                }),
            )
            .with_search_path(self.temp.path().join("bin"))
        }

        fn project(&self) -> PathBuf {
            self.temp.path().join("project")
        }
    }

    fn rebar() -> ToolSpec {
        ToolSpec {
            name: "rebar".to_string(),
            url: Some("https://example.com/rebar".to_string()),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_tool_is_used_directly() {
        use std::os::unix::fs::PermissionsExt;
        let fx = Fixture::new();
        let bin = fx.temp.path().join("bin/rebar");
        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = fx.provisioner().ensure(&rebar(), &fx.project()).await.unwrap();

        assert_eq!(tool.provenance, Provenance::System);
        assert_eq!(tool.path, bin);
        assert!(!fx.project().join("rebar").exists());
        assert!(!fx.store.tool_exists("rebar"));
    }

    #[tokio::test]
    async fn project_copy_is_used_directly() {
        let fx = Fixture::new();
        std::fs::write(fx.project().join("rebar"), b"local").unwrap();

        let tool = fx.provisioner().ensure(&rebar(), &fx.project()).await.unwrap();

        assert_eq!(tool.provenance, Provenance::Project);
        assert!(fx.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cached_tool_is_linked() {
        let fx = Fixture::new();
        fx.store.put_tool("rebar", b"cached").await.unwrap();

        let tool = fx.provisioner().ensure(&rebar(), &fx.project()).await.unwrap();

        assert_eq!(tool.provenance, Provenance::Cache);
        assert_eq!(tool.path, fx.project().join("rebar"));
        assert_eq!(std::fs::read(&tool.path).unwrap(), b"cached");
        assert!(fx.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tool_is_downloaded_stored_and_linked() {
        let fx = Fixture::new();

        let tool = fx.provisioner().ensure(&rebar(), &fx.project()).await.unwrap();

        assert_eq!(tool.provenance, Provenance::Downloaded);
        assert!(fx.store.tool_exists("rebar"));
        assert_eq!(
            std::fs::read(fx.project().join("rebar")).unwrap(),
            fx.store.get_tool("rebar").await.unwrap()
        );
        assert_eq!(std::fs::read_dir(fx.temp.path().join("tmp")).unwrap().count(), 0);
        assert_eq!(*fx.urls.lock().unwrap(), vec!["https://example.com/rebar"]);

        // Second run finds the alias and the cached copy
        let again = fx.provisioner().ensure(&rebar(), &fx.project()).await.unwrap();
        assert_ne!(again.provenance, Provenance::Downloaded);
        assert_eq!(fx.urls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_downloads_use_separate_scratch_files() {
        let fx = Fixture::new();
        let other = fx.temp.path().join("other");
        std::fs::create_dir_all(&other).unwrap();
        // Separate stores so both provisioners have to download
        let second = ToolProvisioner::new(
            Arc::new(LocalStore::new(fx.temp.path().join("other-cache"))),
            fx.temp.path().join("tmp"),
            Box::new(StubDownloader {
                urls: Arc::clone(&fx.urls),
                dests: Arc::clone(&fx.dests),
            }),
        )
        .with_search_path(fx.temp.path().join("bin"));

        let first = fx.provisioner();
        let spec_a = rebar();
        let spec_b = rebar();
        let project = fx.project();
        let (a, b) = tokio::join!(
            first.ensure(&spec_a, &project),
            second.ensure(&spec_b, &other)
        );
        assert_eq!(a.unwrap().provenance, Provenance::Downloaded);
        assert_eq!(b.unwrap().provenance, Provenance::Downloaded);

        let dests = fx.dests.lock().unwrap().clone();
        assert_eq!(dests.len(), 2);
        assert_ne!(dests[0], dests[1]);
        for dest in &dests {
            assert!(dest.starts_with(fx.temp.path().join("tmp")));
            assert!(!dest.exists());
        }
    }

    #[tokio::test]
    async fn configured_source_overrides_default_url() {
        let fx = Fixture::new();
        let provisioner = fx.provisioner().with_sources(HashMap::from([(
            "rebar".to_string(),
            "https://mirror.example.com/rebar".to_string(),
        )]));

        provisioner.ensure(&rebar(), &fx.project()).await.unwrap();
        assert_eq!(*fx.urls.lock().unwrap(), vec!["https://mirror.example.com/rebar"]);
    }

    #[tokio::test]
    async fn no_source_is_tool_error() {
        let fx = Fixture::new();
        let make = ToolSpec {
            name: "make".to_string(),
            url: None,
        };
        let err = fx.provisioner().ensure(&make, &fx.project()).await.unwrap_err();
        assert_eq!(err.kind(), "ToolProvisionError");
    }
}

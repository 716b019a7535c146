//! Build orchestration
//!
//! The controller wires configuration, caches, resolver, tool provisioner
//! and build runner together for one project directory:
//!
//! populate → build → package → publish, and fetch for published packages.

pub mod runner;

pub use runner::{BuildRunner, ProcessRunner};

use crate::cache::{CacheManager, SourceBuilder};
use crate::compiler::{detect_runtime, Compiler};
use crate::config::{Config, ConfigManager};
use crate::error::{CoonError, CoonResult};
use crate::package::packager;
use crate::package::{validate_reference, Package};
use crate::project::{has_project, read_project, Manifest};
use crate::remote::validate_qualified;
use crate::resolve::{DependencyTree, GitFetcher, Resolver, SourceFetcher, DEPS_DIR};
use crate::tool::{HttpDownloader, ToolProvisioner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Subdirectory of the temp dir used for out-of-tree source builds
const BUILD_DIR: &str = "build";

/// Drives every operation on one project
pub struct Controller {
    config: Config,
    /// Configured default compiler, parsed once
    compiler: Compiler,
    project_dir: PathBuf,
    cache: CacheManager,
    fetcher: Box<dyn SourceFetcher>,
    runner: Box<dyn BuildRunner>,
    tools: ToolProvisioner,
}

impl Controller {
    /// Production wiring for the project at `project_dir`
    pub async fn new(config: Config, project_dir: impl Into<PathBuf>) -> CoonResult<Self> {
        ConfigManager::ensure_dirs(&config).await?;
        let runtime = detect_runtime(config.runtime.as_deref()).await;
        debug!("Runtime identity: {}", runtime);

        let cache = CacheManager::new(&config, &runtime);
        let sources = config
            .tools
            .iter()
            .map(|(name, source)| (name.clone(), source.url.clone()))
            .collect();
        let downloader = HttpDownloader::new(Duration::from_secs(config.backend_timeout_secs.max(1)));
        let tools = ToolProvisioner::new(
            std::sync::Arc::clone(cache.store()),
            config.temp_dir.clone(),
            Box::new(downloader),
        )
        .with_sources(sources);

        Ok(Self::with_parts(
            config,
            project_dir,
            cache,
            Box::new(GitFetcher::new()),
            Box::new(ProcessRunner),
            tools,
        ))
    }

    /// Assemble a controller from explicit parts
    pub fn with_parts(
        config: Config,
        project_dir: impl Into<PathBuf>,
        cache: CacheManager,
        fetcher: Box<dyn SourceFetcher>,
        runner: Box<dyn BuildRunner>,
        tools: ToolProvisioner,
    ) -> Self {
        let compiler = config.compiler();
        debug!("Default compiler: {}", compiler);
        Self {
            config,
            compiler,
            project_dir: project_dir.into(),
            cache,
            fetcher,
            runner,
            tools,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Compiler used for packages that do not name one
    pub fn default_compiler(&self) -> Compiler {
        self.compiler
    }

    /// Scaffold a new project named `name` under `parent`
    pub async fn create(parent: &Path, name: &str) -> CoonResult<PathBuf> {
        let dir = parent.join(name);
        if has_project(&dir) {
            return Err(CoonError::User(format!(
                "{} already contains a project",
                dir.display()
            )));
        }

        let manifest = Manifest::new(name);
        // Validates the name before anything touches the disk
        Manifest::parse(&manifest.to_toml()?)?;

        fs::create_dir_all(dir.join("src"))
            .await
            .map_err(|e| CoonError::io(format!("creating {}", dir.display()), e))?;
        manifest.save(&dir).await?;

        info!("Created project {} in {}", name, dir.display());
        Ok(dir)
    }

    /// The project itself as a package
    pub async fn root(&self) -> CoonResult<Package> {
        let config = read_project(&self.project_dir).await?;
        Ok(Package::from_config(config.as_ref(), &self.project_dir))
    }

    /// Resolve the project's dependency tree
    pub async fn populate(&self) -> CoonResult<DependencyTree> {
        let root = self.root().await?;
        Resolver::new(self.fetcher.as_ref())
            .with_cache(&self.cache)
            .populate(root)
            .await
    }

    /// Build every dependency in order, then the project
    pub async fn build(&self) -> CoonResult<DependencyTree> {
        let tree = self.populate().await?;

        for dep in tree.dependencies() {
            let dir = self.project_dir.join(DEPS_DIR).join(&dep.name);
            if self.cache.exists_local(dep) {
                debug!("{}@{} is cached, unpacking", dep.name, dep.version);
                let payload = self.cache.get_local(dep).await?;
                packager::unpack(&payload, &dir)?;
                continue;
            }

            self.compile(dep, &dir).await?;
            let artifact = packager::package(&dir, &dep.name, &dep.outputs)?;
            self.cache
                .store()
                .put_file(&dep.identity(self.cache.runtime()), &artifact)
                .await?;
        }

        let root = tree.root();
        self.compile(root, &self.project_dir).await?;
        info!("Built {}", root.name);
        Ok(tree)
    }

    /// Bundle the project's outputs and store the artifact locally
    pub async fn package(&self) -> CoonResult<PathBuf> {
        let root = self.root().await?;
        let artifact = packager::package(&self.project_dir, &root.name, &root.outputs)?;
        self.cache
            .store()
            .put_file(&root.identity(self.cache.runtime()), &artifact)
            .await?;
        Ok(artifact)
    }

    /// Publish the project to `backend`, packaging it first when needed
    pub async fn add_package(
        &self,
        backend: &str,
        recursive: bool,
        with_deps: bool,
    ) -> CoonResult<bool> {
        self.known_backend(backend)?;
        let root = self.root().await?;
        let packaged = root.artifact_path().map(|p| p.is_file()).unwrap_or(false);
        if !packaged {
            self.package().await?;
        }
        Ok(self
            .cache
            .add_package(&root, backend, recursive, with_deps)
            .await)
    }

    /// Make a published package and its dependencies available locally
    pub async fn fetch(&self, qualified: &str, version: &str) -> CoonResult<Vec<Package>> {
        validate_qualified(qualified)?;
        validate_reference(version).map_err(CoonError::User)?;
        let pack = Package::published(qualified, version);
        self.cache.resolve_or_fetch(&pack, self).await
    }

    /// Published versions of `qualified` on `backend`
    pub async fn versions(&self, backend: &str, qualified: &str) -> CoonResult<Vec<String>> {
        validate_qualified(qualified)?;
        self.known_backend(backend)?;
        Ok(self.cache.versions(backend, qualified).await)
    }

    fn known_backend(&self, backend: &str) -> CoonResult<()> {
        if self.cache.backend_names().contains(&backend) {
            Ok(())
        } else {
            Err(CoonError::BackendNotFound(backend.to_string()))
        }
    }

    /// Run the build command for `pack` in `dir`
    async fn compile(&self, pack: &Package, dir: &Path) -> CoonResult<()> {
        let compiler = pack.compiler.unwrap_or(self.compiler);
        let mut command = pack
            .build_command
            .clone()
            .unwrap_or_else(|| compiler.default_command());

        if let Some(spec) = compiler.tool() {
            let tool = self.tools.ensure(&spec, dir).await?;
            if command.first() == Some(&spec.name) {
                command[0] = tool.path.display().to_string();
            }
        }

        info!("Compiling {} with {}", pack.name, compiler);
        self.runner.run(pack, &command, dir).await
    }
}

#[async_trait]
impl SourceBuilder for Controller {
    async fn build_from_source(&self, pack: &Package) -> CoonResult<Vec<u8>> {
        let coordinate = pack.coordinate.clone().ok_or_else(|| {
            CoonError::resolution(
                &pack.name,
                pack.origin_display(),
                "not found in any cache and no source coordinate to build from",
            )
        })?;

        let dir = self.config.temp_dir.join(BUILD_DIR).join(&pack.name);
        self.fetcher
            .fetch(&coordinate, &dir)
            .await
            .map_err(|e| CoonError::resolution(&pack.name, coordinate.to_string(), e.to_string()))?;

        let mut built = pack.clone();
        let config = read_project(&dir).await?;
        built.apply_config(config.as_ref());
        built.path = Some(dir.clone());

        self.compile(&built, &dir).await?;
        let artifact = packager::package(&dir, &built.name, &built.outputs)?;
        let payload = fs::read(&artifact)
            .await
            .map_err(|e| CoonError::io(format!("reading {}", artifact.display()), e))?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            warn!("Cannot clean {}: {}", dir.display(), e);
        }
        Ok(payload)
    }
}

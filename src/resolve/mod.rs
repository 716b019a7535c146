//! Dependency resolution
//!
//! Expands a root package into its full dependency tree. Traversal is an
//! iterative depth-first walk over an explicit stack, so the names on the
//! stack are exactly the packages in progress and a repeat among them is a
//! cycle.
//!
//! A dependency is materialized from the first source that has it:
//!
//! | Order | Source | Node source |
//! |-------|--------|-------------|
//! | 1 | `deps/{name}` checkout in the project | `Checkout` |
//! | 2 | Local store artifact | `Cached` |
//! | 3 | Source fetch into `deps/{name}` | `Checkout` |
//! | 4 | Remote artifact, written through | `Cached` |
//!
//! Names are unique per tree; the first occurrence wins.

pub mod fetch;

pub use fetch::{GitFetcher, SourceFetcher};

use crate::cache::CacheManager;
use crate::error::{CoonError, CoonResult};
use crate::package::packager::read_manifest;
use crate::package::{Coordinate, NodeSource, Package};
use crate::project::{has_project, read_project};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory under the project root holding dependency checkouts
pub const DEPS_DIR: &str = "deps";

/// Resolved packages, unique by name
#[derive(Debug, Clone)]
pub struct DependencyTree {
    /// Arena in discovery order; the root is always first
    nodes: Vec<Package>,
    index: HashMap<String, usize>,
    /// Post-order of the traversal
    order: Vec<usize>,
}

impl DependencyTree {
    /// The project being resolved
    pub fn root(&self) -> &Package {
        &self.nodes[0]
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Number of packages, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Package names in discovery order
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Dependencies before dependents, root last
    pub fn build_order(&self) -> Vec<&Package> {
        self.order.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Dependencies only, in build order
    pub fn dependencies(&self) -> Vec<&Package> {
        self.order
            .iter()
            .filter(|&&i| i != 0)
            .map(|&i| &self.nodes[i])
            .collect()
    }

    /// Direct dependencies of `name`
    pub fn dependencies_of(&self, name: &str) -> Vec<&Package> {
        self.get(name)
            .map(|pack| pack.deps.iter().filter_map(|d| self.get(d)).collect())
            .unwrap_or_default()
    }
}

/// One package whose declared dependencies are still being walked
struct Frame {
    node: usize,
    pending: VecDeque<(String, Coordinate)>,
}

/// Resolves dependency trees for a project
pub struct Resolver<'a> {
    fetcher: &'a dyn SourceFetcher,
    cache: Option<&'a CacheManager>,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn SourceFetcher) -> Self {
        Self {
            fetcher,
            cache: None,
        }
    }

    /// Let cached artifacts stand in for source fetches
    pub fn with_cache(mut self, cache: &'a CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve the full tree of `root`.
    ///
    /// `root` must carry its project directory; dependency checkouts live
    /// in its `deps` subdirectory.
    pub async fn populate(&self, root: Package) -> CoonResult<DependencyTree> {
        let root_dir = root.path.clone().ok_or_else(|| {
            CoonError::Internal(format!("root package {} has no directory", root.name))
        })?;
        let deps_dir = root_dir.join(DEPS_DIR);

        let mut nodes = Vec::new();
        let mut index = HashMap::new();
        let mut order = Vec::new();

        let mut stack = vec![Frame {
            node: 0,
            pending: root.declared.iter().cloned().collect(),
        }];
        index.insert(root.name.clone(), 0);
        nodes.push(Package {
            deps: Vec::new(),
            ..root
        });

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some(frame) => frame.pending.pop_front().map(|dep| (frame.node, dep)),
            };

            let (parent, (name, coordinate)) = match next {
                Some(next) => next,
                None => {
                    if let Some(done) = stack.pop() {
                        order.push(done.node);
                    }
                    continue;
                }
            };

            if let Some(start) = stack.iter().position(|f| nodes[f.node].name == name) {
                let mut cycle: Vec<String> = stack[start..]
                    .iter()
                    .map(|f| nodes[f.node].name.clone())
                    .collect();
                cycle.push(name);
                return Err(CoonError::CyclicDependency { cycle });
            }

            if let Some(&existing) = index.get(&name) {
                let known: &Package = &nodes[existing];
                let requested = coordinate.version();
                if known.version != requested {
                    warn!(
                        "{} requires {}@{} but {} is already resolved, keeping it",
                        nodes[parent].name, name, requested, known.version
                    );
                }
                add_edge(&mut nodes[parent], &name);
                continue;
            }

            let pack = self.materialize(&deps_dir, &name, coordinate).await?;
            debug!("Resolved {} ({:?})", pack.name, pack.source);

            let node = nodes.len();
            add_edge(&mut nodes[parent], &name);
            stack.push(Frame {
                node,
                pending: pack.declared.iter().cloned().collect(),
            });
            index.insert(name, node);
            nodes.push(pack);
        }

        info!("Resolved {} packages", nodes.len());
        Ok(DependencyTree {
            nodes,
            index,
            order,
        })
    }

    /// Build the node for a newly discovered dependency
    async fn materialize(
        &self,
        deps_dir: &Path,
        name: &str,
        coordinate: Coordinate,
    ) -> CoonResult<Package> {
        let checkout = deps_dir.join(name);
        let mut pack = Package::from_dep(name, coordinate.clone());

        if has_project(&checkout) {
            return self.from_checkout(pack, checkout).await;
        }

        if let Some(cache) = self.cache {
            if cache.exists_local(&pack) {
                let payload = cache.get_local(&pack).await?;
                apply_artifact(&mut pack, &payload)?;
                return Ok(pack);
            }
        }

        let fetch_error = match self.fetcher.fetch(&coordinate, &checkout).await {
            Ok(()) => return self.from_checkout(pack, checkout).await,
            Err(e) => e,
        };
        warn!("Fetching {} failed: {}", coordinate, fetch_error);

        if let Some(cache) = self.cache {
            if let Some(payload) = cache.fetch_remote(&pack).await? {
                apply_artifact(&mut pack, &payload)?;
                return Ok(pack);
            }
        }

        Err(CoonError::resolution(
            name,
            coordinate.to_string(),
            fetch_error.to_string(),
        ))
    }

    async fn from_checkout(&self, mut pack: Package, dir: PathBuf) -> CoonResult<Package> {
        let config = read_project(&dir).await.map_err(|e| {
            CoonError::resolution(&pack.name, pack.origin_display(), e.to_string())
        })?;
        pack.apply_config(config.as_ref());
        pack.path = Some(dir);
        pack.source = NodeSource::Checkout;
        Ok(pack)
    }
}

fn add_edge(parent: &mut Package, name: &str) {
    if !parent.deps.iter().any(|d| d == name) {
        parent.deps.push(name.to_string());
    }
}

/// Fill `pack` from the manifest embedded in its artifact
fn apply_artifact(pack: &mut Package, payload: &[u8]) -> CoonResult<()> {
    let manifest = read_manifest(payload)
        .map_err(|e| CoonError::resolution(&pack.name, pack.origin_display(), e.to_string()))?;
    pack.apply_config(&manifest);
    pack.source = NodeSource::Cached;
    Ok(())
}

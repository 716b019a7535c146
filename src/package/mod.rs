//! Packages, source coordinates and artifact identities

pub mod packager;

use crate::compiler::Compiler;
use crate::project::ProjectConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of packaged artifacts
pub const ARTIFACT_EXTENSION: &str = "cp";

/// Branch implied when a coordinate names no reference
pub const DEFAULT_BRANCH: &str = "master";

/// Where to obtain a dependency's source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Repository URL
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// The authoritative reference of a coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    Tag(String),
    Commit(String),
    Branch(String),
}

impl GitRef {
    /// The reference value, which doubles as the package version
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(v) | Self::Commit(v) | Self::Branch(v) => v,
        }
    }
}

impl Coordinate {
    /// Coordinate pinned to a tag
    pub fn tagged(url: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            tag: Some(tag.into()),
            commit: None,
        }
    }

    /// Resolve the reference: tag, then commit, then branch, then the default branch
    pub fn reference(&self) -> GitRef {
        if let Some(tag) = &self.tag {
            GitRef::Tag(tag.clone())
        } else if let Some(commit) = &self.commit {
            GitRef::Commit(commit.clone())
        } else if let Some(branch) = &self.branch {
            GitRef::Branch(branch.clone())
        } else {
            GitRef::Branch(DEFAULT_BRANCH.to_string())
        }
    }

    /// Version string this coordinate resolves to
    pub fn version(&self) -> String {
        self.reference().as_str().to_string()
    }

    /// Owner segment of the repository URL, e.g. `comtihon` for
    /// `https://github.com/comtihon/dep.git`
    pub fn namespace(&self) -> Option<String> {
        let trimmed = self.url.trim_end_matches('/');
        // scp-like urls: git@github.com:owner/repo.git
        let path = match trimmed.split_once("://") {
            Some((_, rest)) => rest.split_once('/').map(|(_, p)| p)?,
            None => trimmed.rsplit_once(':').map(|(_, p)| p).unwrap_or(trimmed),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return None;
        }
        Some(segments[segments.len() - 2].to_string())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.url, self.version())
    }
}

/// Cache key: package name, version and runtime identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity {
    pub name: String,
    pub version: String,
    pub runtime: String,
}

impl ArtifactIdentity {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        runtime: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            runtime: runtime.into(),
        }
    }

    /// Artifact file name for this identity
    pub fn file_name(&self) -> String {
        artifact_file_name(&self.name)
    }

    /// The version as a single path segment
    pub fn version_segment(&self) -> String {
        version_segment(&self.version)
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.version, self.runtime)
    }
}

/// Reject references that cannot name a version directory: empty,
/// `.` or `..` path segments
pub fn validate_reference(reference: &str) -> Result<(), String> {
    if reference
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(format!(
            "invalid reference '{}': empty, '.' or '..' path segment",
            reference
        ));
    }
    Ok(())
}

/// Encode a version so it occupies exactly one path segment.
///
/// Branches such as `feature/x` keep the `name/version/runtime` layout
/// intact; [`decode_version_segment`] reverses the mapping.
pub fn version_segment(version: &str) -> String {
    if version == "." || version == ".." {
        return version.replace('.', "%2E");
    }
    let mut out = String::with_capacity(version.len());
    for c in version.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`version_segment`]
pub fn decode_version_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escaped = &rest[pos..];
        let decoded = match escaped.get(..3) {
            Some("%25") => Some('%'),
            Some("%2F") => Some('/'),
            Some("%5C") => Some('\\'),
            Some("%2E") => Some('.'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &escaped[3..];
            }
            None => {
                out.push('%');
                rest = &escaped[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// `{name}.cp`
pub fn artifact_file_name(name: &str) -> String {
    format!("{}.{}", name, ARTIFACT_EXTENSION)
}

/// How a tree node was materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSource {
    /// The project being built
    Root,
    /// Source checked out under the project's deps directory
    Checkout,
    /// Taken from a cached artifact, no source available
    Cached,
    /// Known only by coordinates (not yet materialized)
    Declared,
}

/// A package in a dependency tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// Owner under which the package is published
    pub namespace: Option<String>,
    /// Source coordinate; `None` for the root project
    pub coordinate: Option<Coordinate>,
    /// Directory holding the package sources, when they exist locally
    pub path: Option<PathBuf>,
    pub version: String,
    /// Compiler requested by the package itself
    pub compiler: Option<Compiler>,
    /// Build output directories, relative to `path`
    pub outputs: Vec<String>,
    /// Explicit build command
    pub build_command: Option<Vec<String>>,
    /// Dependencies as declared, in declaration order
    pub declared: Vec<(String, Coordinate)>,
    /// Names of resolved dependency nodes
    pub deps: Vec<String>,
    pub source: NodeSource,
}

impl Package {
    /// Package known only by its declaring coordinate
    pub fn from_dep(name: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            name: name.into(),
            namespace: coordinate.namespace(),
            version: coordinate.version(),
            coordinate: Some(coordinate),
            path: None,
            compiler: None,
            outputs: Vec::new(),
            build_command: None,
            declared: Vec::new(),
            deps: Vec::new(),
            source: NodeSource::Declared,
        }
    }

    /// Package known only by its published name, e.g. `comtihon/dep@1.0.0`
    pub fn published(qualified: &str, version: impl Into<String>) -> Self {
        let (namespace, name) = match qualified.split_once('/') {
            Some((ns, name)) => (Some(ns.to_string()), name.to_string()),
            None => (None, qualified.to_string()),
        };
        Self {
            name,
            namespace,
            coordinate: None,
            path: None,
            version: version.into(),
            compiler: None,
            outputs: Vec::new(),
            build_command: None,
            declared: Vec::new(),
            deps: Vec::new(),
            source: NodeSource::Declared,
        }
    }

    /// Root package read from a project directory
    pub fn from_config(config: &dyn ProjectConfig, path: &Path) -> Self {
        let origin = config.origin();
        Self {
            name: config.name().to_string(),
            namespace: origin.as_ref().and_then(Coordinate::namespace),
            version: origin
                .as_ref()
                .map(Coordinate::version)
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            coordinate: None,
            path: Some(path.to_path_buf()),
            compiler: config.compiler(),
            outputs: config.outputs(),
            build_command: config.build_command(),
            declared: config.dependencies(),
            deps: Vec::new(),
            source: NodeSource::Root,
        }
    }

    /// Fill in what a dependency's own config declares
    pub fn apply_config(&mut self, config: &dyn ProjectConfig) {
        self.compiler = config.compiler();
        self.outputs = config.outputs();
        self.build_command = config.build_command();
        self.declared = config.dependencies();
        if self.namespace.is_none() {
            self.namespace = config.origin().as_ref().and_then(Coordinate::namespace);
        }
    }

    /// `{namespace}/{name}`, or just the name without a namespace
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Cache key under the given runtime identity
    pub fn identity(&self, runtime: &str) -> ArtifactIdentity {
        ArtifactIdentity::new(&self.name, &self.version, runtime)
    }

    /// `{path}/{name}.cp`, if the package has a local directory
    pub fn artifact_path(&self) -> Option<PathBuf> {
        self.path
            .as_ref()
            .map(|p| p.join(artifact_file_name(&self.name)))
    }

    /// Human-readable origin for error reports
    pub fn origin_display(&self) -> String {
        match (&self.coordinate, &self.path) {
            (Some(c), _) => c.to_string(),
            (None, Some(p)) => p.display().to_string(),
            (None, None) => format!("{}@{}", self.qualified_name(), self.version),
        }
    }

    /// Declared dependencies as fresh, unresolved packages
    pub fn declared_packages(&self) -> Vec<Package> {
        self.declared
            .iter()
            .map(|(name, coordinate)| Package::from_dep(name.clone(), coordinate.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate() -> Coordinate {
        Coordinate {
            url: "https://github.com/comtihon/dep".to_string(),
            branch: Some("develop".to_string()),
            tag: None,
            commit: None,
        }
    }

    #[test]
    fn tag_takes_precedence_over_branch() {
        let mut c = coordinate();
        c.tag = Some("1.0.0".to_string());
        assert_eq!(c.reference(), GitRef::Tag("1.0.0".to_string()));
        assert_eq!(c.version(), "1.0.0");
    }

    #[test]
    fn commit_takes_precedence_over_branch() {
        let mut c = coordinate();
        c.commit = Some("abc123".to_string());
        assert_eq!(c.reference(), GitRef::Commit("abc123".to_string()));
    }

    #[test]
    fn default_branch_when_unpinned() {
        let mut c = coordinate();
        c.branch = None;
        assert_eq!(c.version(), DEFAULT_BRANCH);
    }

    #[test]
    fn namespace_from_url() {
        assert_eq!(coordinate().namespace().as_deref(), Some("comtihon"));
        let scp = Coordinate::tagged("git@github.com:comtihon/dep.git", "1.0.0");
        assert_eq!(scp.namespace().as_deref(), Some("comtihon"));
        let bare = Coordinate::tagged("https://example.com/dep", "1.0.0");
        assert_eq!(bare.namespace(), None);
    }

    #[test]
    fn identity_display_and_file_name() {
        let id = ArtifactIdentity::new("dep", "1.0.0", "26");
        assert_eq!(id.to_string(), "dep/1.0.0/26");
        assert_eq!(id.file_name(), "dep.cp");
    }

    #[test]
    fn from_dep_derives_version_and_namespace() {
        let pack = Package::from_dep("dep", Coordinate::tagged("https://github.com/comtihon/dep", "1.0.0"));
        assert_eq!(pack.version, "1.0.0");
        assert_eq!(pack.qualified_name(), "comtihon/dep");
        assert_eq!(pack.identity("26"), ArtifactIdentity::new("dep", "1.0.0", "26"));
        assert_eq!(pack.source, NodeSource::Declared);
    }

    #[test]
    fn version_segments_stay_single() {
        assert_eq!(version_segment("1.0.0"), "1.0.0");
        assert_eq!(version_segment("feature/x"), "feature%2Fx");
        assert_eq!(version_segment(".."), "%2E%2E");
        assert!(!version_segment("../../escaped").contains('/'));
        for version in ["1.0.0", "feature/x", "100%", "a%2Fb", "..", "win\\path"] {
            assert_eq!(decode_version_segment(&version_segment(version)), version);
        }
    }

    #[test]
    fn references_reject_relative_segments() {
        assert!(validate_reference("1.0.0").is_ok());
        assert!(validate_reference("feature/x").is_ok());
        assert!(validate_reference("../../escaped").is_err());
        assert!(validate_reference("..").is_err());
        assert!(validate_reference("").is_err());
        assert!(validate_reference("a//b").is_err());
    }

    #[test]
    fn published_splits_namespace() {
        let pack = Package::published("comtihon/test_project", "1.1.0");
        assert_eq!(pack.name, "test_project");
        assert_eq!(pack.namespace.as_deref(), Some("comtihon"));
        assert_eq!(pack.version, "1.1.0");
        assert_eq!(pack.origin_display(), "comtihon/test_project@1.1.0");
    }
}

//! Configuration schema for coon
//!
//! Configuration is stored at `~/.config/coon/config.toml`

use crate::compiler::Compiler;
use crate::remote::CacheKind;
use crate::store::LocalStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scratch directory for downloads and out-of-tree builds
    pub temp_dir: PathBuf,

    /// Default compiler: coon, rebar, rebar3 or erlang.mk
    pub compiler: String,

    /// Runtime identity override; probed from the installed runtime when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Upper bound for a single remote backend call
    pub backend_timeout_secs: u64,

    /// Caches in lookup order
    pub cache: Vec<CacheSpec>,

    /// Download sources for build tools, by tool name
    pub tools: HashMap<String, ToolSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("coon"),
            compiler: Compiler::default().to_string(),
            runtime: None,
            backend_timeout_secs: 60,
            cache: vec![CacheSpec::local(
                "local_cache",
                format!("file://{}", LocalStore::default_root().display()),
            )],
            tools: HashMap::new(),
        }
    }
}

/// One `[[cache]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSpec {
    /// Name used to address the cache from the command line
    pub name: String,

    /// local, filesystem-remote or http-remote
    #[serde(rename = "type")]
    pub kind: String,

    /// `file://` URL or path for filesystem caches, base URL for HTTP
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Bearer token, used instead of username/password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Publish namespace override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl CacheSpec {
    /// A local cache entry
    pub fn local(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CacheKind::Local.to_string(),
            url: url.into(),
            username: None,
            password: None,
            token: None,
            namespace: None,
        }
    }

    /// Parsed kind; `None` for unknown kinds
    pub fn cache_kind(&self) -> Option<CacheKind> {
        CacheKind::parse(&self.kind)
    }
}

/// Where to download a tool from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSource {
    pub url: String,
}

impl Config {
    /// Default compiler, falling back with a warning on unknown names
    pub fn compiler(&self) -> Compiler {
        Compiler::parse_logged(&self.compiler)
    }

    /// Root of the local store: the first `local` cache entry
    pub fn local_cache_root(&self) -> PathBuf {
        let mut locals = self
            .cache
            .iter()
            .filter(|spec| spec.cache_kind() == Some(CacheKind::Local));
        let root = match locals.next() {
            Some(spec) => file_url_to_path(&spec.url),
            None => LocalStore::default_root(),
        };
        if let Some(extra) = locals.next() {
            warn!("Ignoring additional local cache {}", extra.name);
        }
        root
    }

    /// Remote cache entries in declaration order; unknown kinds are skipped
    pub fn remote_caches(&self) -> Vec<&CacheSpec> {
        self.cache
            .iter()
            .filter(|spec| match spec.cache_kind() {
                Some(CacheKind::Local) => false,
                Some(_) => true,
                None => {
                    warn!("Unknown cache type '{}' for {}, skipping", spec.kind, spec.name);
                    false
                }
            })
            .collect()
    }

    /// Download URL override for `tool`
    pub fn tool_url(&self, tool: &str) -> Option<&str> {
        self.tools.get(tool).map(|source| source.url.as_str())
    }
}

/// Turn a `file://` URL or plain path into a path
pub fn file_url_to_path(location: &str) -> PathBuf {
    if location.starts_with("file:") {
        if let Ok(path) = url::Url::parse(location).and_then(|u| {
            u.to_file_path()
                .map_err(|_| url::ParseError::RelativeUrlWithoutBase)
        }) {
            return path;
        }
        return PathBuf::from(location.trim_start_matches("file://"));
    }
    PathBuf::from(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[[cache]]"));
        assert!(toml.contains("type = \"local\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.compiler(), Compiler::Coon);
        assert_eq!(config.cache.len(), 1);
        assert!(config.remote_caches().is_empty());
    }

    #[test]
    fn config_deserializes_caches_in_order() {
        let toml = r#"
            temp_dir = "/tmp/coon-test"
            compiler = "rebar3"

            [[cache]]
            name = "local_cache"
            type = "local"
            url = "file:///var/cache/coon"

            [[cache]]
            name = "artifactory-local"
            type = "artifactory"
            url = "http://localhost:8081/artifactory/example-repo-local"
            username = "admin"
            password = "password"

            [[cache]]
            name = "shared"
            type = "filesystem-remote"
            url = "/mnt/shared"

            [tools.rebar3]
            url = "https://example.com/rebar3"
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.temp_dir, PathBuf::from("/tmp/coon-test"));
        assert_eq!(config.compiler(), Compiler::Rebar3);
        assert_eq!(config.local_cache_root(), PathBuf::from("/var/cache/coon"));

        let remotes: Vec<&str> = config
            .remote_caches()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(remotes, vec!["artifactory-local", "shared"]);
        assert_eq!(config.tool_url("rebar3"), Some("https://example.com/rebar3"));
        assert_eq!(config.backend_timeout_secs, 60);
    }

    #[test]
    fn unknown_compiler_falls_back() {
        let config: Config = toml::from_str("compiler = \"gradle\"").unwrap();
        assert_eq!(config.compiler(), Compiler::Coon);
    }

    #[test]
    fn unknown_cache_kind_is_skipped() {
        let toml = r#"
            [[cache]]
            name = "s3"
            type = "s3"
            url = "s3://bucket"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.remote_caches().is_empty());
        assert_eq!(config.local_cache_root(), LocalStore::default_root());
    }

    #[test]
    fn file_urls_and_plain_paths() {
        assert_eq!(file_url_to_path("file:///tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(file_url_to_path("/tmp/y"), PathBuf::from("/tmp/y"));
    }
}

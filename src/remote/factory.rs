//! Backend factory
//!
//! Maps the configured cache type onto a concrete backend.

use crate::config::schema::{file_url_to_path, CacheSpec};
use crate::error::{CoonError, CoonResult};
use crate::remote::filesystem::FilesystemBackend;
use crate::remote::http::{Credentials, HttpBackend};
use crate::remote::RemoteBackend;
use std::fmt;
use std::time::Duration;

/// Cache flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// The local store on this machine
    Local,
    /// Another filesystem root, local or network-mounted
    FilesystemRemote,
    /// HTTP artifact repository
    HttpRemote,
}

impl CacheKind {
    /// Parse a configured type name; `None` for unknown names
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "filesystem-remote" | "filesystem" | "fs" => Some(Self::FilesystemRemote),
            "http-remote" | "http" | "artifactory" => Some(Self::HttpRemote),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::FilesystemRemote => "filesystem-remote",
            Self::HttpRemote => "http-remote",
        };
        write!(f, "{}", name)
    }
}

/// Create the remote backend described by `spec`.
///
/// # Returns
/// * `Ok(Some(backend))` - for remote cache types
/// * `Ok(None)` - for the local cache, which configures the local store instead
/// * `Err` - if the type is unknown or the entry is incomplete
pub fn create_backend(
    spec: &CacheSpec,
    runtime: &str,
    timeout: Duration,
) -> CoonResult<Option<Box<dyn RemoteBackend>>> {
    let kind = spec.cache_kind().ok_or_else(|| CoonError::ConfigInvalid {
        path: format!("cache.{}", spec.name).into(),
        reason: format!("unknown cache type '{}'", spec.kind),
    })?;

    match kind {
        CacheKind::Local => Ok(None),
        CacheKind::FilesystemRemote => Ok(Some(Box::new(FilesystemBackend::new(
            &spec.name,
            file_url_to_path(&spec.url),
            runtime,
            spec.namespace.clone(),
        )))),
        CacheKind::HttpRemote => {
            let credentials = match (&spec.token, &spec.username) {
                (Some(token), _) => Credentials::Token(token.clone()),
                (None, Some(username)) => Credentials::Basic {
                    username: username.clone(),
                    password: spec.password.clone().unwrap_or_default(),
                },
                (None, None) => Credentials::Anonymous,
            };
            let backend = HttpBackend::new(&spec.name, &spec.url, credentials, runtime, timeout)?
                .with_namespace(spec.namespace.clone());
            Ok(Some(Box::new(backend)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: &str, url: &str) -> CacheSpec {
        CacheSpec {
            name: "remote".to_string(),
            kind: kind.to_string(),
            url: url.to_string(),
            username: Some("admin".to_string()),
            password: Some("password".to_string()),
            token: None,
            namespace: None,
        }
    }

    #[test]
    fn parse_kinds_and_aliases() {
        assert_eq!(CacheKind::parse("local"), Some(CacheKind::Local));
        assert_eq!(CacheKind::parse("artifactory"), Some(CacheKind::HttpRemote));
        assert_eq!(CacheKind::parse("Filesystem-Remote"), Some(CacheKind::FilesystemRemote));
        assert_eq!(CacheKind::parse("s3"), None);
    }

    #[test]
    fn local_yields_no_backend() {
        let backend = create_backend(&spec("local", "file:///tmp/c"), "26", Duration::from_secs(1))
            .unwrap();
        assert!(backend.is_none());
    }

    #[test]
    fn creates_filesystem_backend() {
        let backend = create_backend(&spec("fs", "/tmp/remote"), "26", Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(backend.kind(), CacheKind::FilesystemRemote);
        assert_eq!(backend.name(), "remote");
    }

    #[test]
    fn creates_http_backend_with_account() {
        let backend = create_backend(
            &spec("artifactory", "http://localhost:8081/artifactory/repo"),
            "26",
            Duration::from_secs(1),
        )
        .unwrap()
        .unwrap();
        assert_eq!(backend.kind(), CacheKind::HttpRemote);
        assert_eq!(backend.account(), Some("admin"));
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let err = match create_backend(&spec("s3", "s3://b"), "26", Duration::from_secs(1)) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn invalid_http_url_is_config_error() {
        let result = create_backend(&spec("http", "not a url"), "26", Duration::from_secs(1));
        assert!(result.is_err());
    }
}

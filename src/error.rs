//! Error types for coon
//!
//! All modules use `CoonResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for coon operations
pub type CoonResult<T> = Result<T, CoonError>;

/// All errors that can occur in coon
#[derive(Error, Debug)]
pub enum CoonError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Resolution errors
    #[error("Cannot resolve {package} from {coordinate}: {reason}")]
    Resolution {
        package: String,
        coordinate: String,
        reason: String,
    },

    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    // Cache errors
    #[error("Cache backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Unknown cache backend: {0}")]
    BackendNotFound(String),

    #[error("Artifact {0} is not in the local cache")]
    CacheMiss(String),

    #[error("Failed to write {key} into the local cache: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: std::io::Error,
    },

    // Tool errors
    #[error("Cannot provision tool {tool}: {reason}")]
    ToolProvision { tool: String, reason: String },

    // Build errors
    #[error("Failed to package {package}: {reason}")]
    Packaging { package: String, reason: String },

    #[error("Build of {package} failed: {output}")]
    Build { package: String, output: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CoonError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(
        package: impl Into<String>,
        coordinate: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Resolution {
            package: package.into(),
            coordinate: coordinate.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a tool provisioning error
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolProvision {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Create a packaging error
    pub fn packaging(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Packaging {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Create a cache write error
    pub fn cache_write(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::CacheWrite {
            key: key.into(),
            source,
        }
    }

    /// Taxonomy name of the error, used in user-facing reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigInvalid { .. } | Self::ConfigNotFound(_) | Self::ConfigDirCreate { .. } => {
                "ConfigError"
            }
            Self::Resolution { .. } => "ResolutionError",
            Self::CyclicDependency { .. } => "CyclicDependencyError",
            Self::BackendUnavailable { .. } | Self::BackendNotFound(_) => "BackendUnavailable",
            Self::ToolProvision { .. } => "ToolProvisionError",
            Self::Packaging { .. } => "PackagingError",
            Self::CacheWrite { .. } => "CacheWriteError",
            Self::CacheMiss(_) => "CacheMiss",
            Self::Build { .. } => "BuildError",
            _ => "InternalError",
        }
    }

    /// Whether this error only affects a single remote backend
    pub fn is_backend_local(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => Some("Run: coon create <name> to scaffold a project"),
            Self::CyclicDependency { .. } => Some("Remove one of the dependencies in the cycle"),
            Self::BackendNotFound(_) => Some("Check the [[cache]] entries in your config.toml"),
            Self::ToolProvision { .. } => {
                Some("Install the build tool or set [tools.<name>] url in config.toml")
            }
            Self::Packaging { .. } => Some("Run: coon build before packaging"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoonError::resolution("dep", "https://github.com/comtihon/dep@1.0.0", "offline");
        assert!(err.to_string().contains("Cannot resolve dep"));
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn cycle_display_names_cycle() {
        let err = CoonError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency detected: a -> b -> a");
    }

    #[test]
    fn error_kind() {
        assert_eq!(
            CoonError::backend_unavailable("remote", "refused").kind(),
            "BackendUnavailable"
        );
        assert_eq!(CoonError::packaging("p", "missing").kind(), "PackagingError");
        assert_eq!(
            CoonError::ConfigNotFound(PathBuf::from("coon.toml")).kind(),
            "ConfigError"
        );
    }

    #[test]
    fn error_hint() {
        let err = CoonError::packaging("p", "ebin missing");
        assert_eq!(err.hint(), Some("Run: coon build before packaging"));
        assert!(CoonError::Internal("x".into()).hint().is_none());
    }

    #[test]
    fn backend_errors_are_isolated() {
        assert!(CoonError::backend_unavailable("r", "timeout").is_backend_local());
        assert!(!CoonError::Internal("x".into()).is_backend_local());
    }
}

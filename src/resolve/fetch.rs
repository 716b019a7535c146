//! Dependency source fetching

use crate::error::{CoonError, CoonResult};
use crate::package::{Coordinate, GitRef};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Obtains the source tree a coordinate points at
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Materialize the source of `coordinate` into `dest`
    async fn fetch(&self, coordinate: &Coordinate, dest: &Path) -> CoonResult<()>;
}

/// Fetches sources with the `git` executable
pub struct GitFetcher {
    git: String,
}

impl GitFetcher {
    pub fn new() -> Self {
        Self {
            git: "git".to_string(),
        }
    }

    /// Use a specific git executable
    pub fn with_executable(git: impl Into<String>) -> Self {
        Self { git: git.into() }
    }

    /// Run git and fail with its stderr on a non-zero exit
    async fn exec(&self, args: &[&str]) -> CoonResult<()> {
        debug!("Executing: {} {:?}", self.git, args);

        let output = Command::new(&self.git)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CoonError::command_failed(format!("{} {:?}", self.git, args), e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoonError::command_exec(
                format!("{} {}", self.git, args.join(" ")),
                stderr.trim(),
            ))
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    async fn fetch(&self, coordinate: &Coordinate, dest: &Path) -> CoonResult<()> {
        if dest.exists() {
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| CoonError::io(format!("clearing {}", dest.display()), e))?;
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoonError::io(format!("creating {}", parent.display()), e))?;
        }

        let dest_str = dest.to_string_lossy();
        info!("Fetching {}", coordinate);

        match coordinate.reference() {
            GitRef::Tag(name) | GitRef::Branch(name) => {
                self.exec(&[
                    "clone",
                    "--quiet",
                    "--depth",
                    "1",
                    "--branch",
                    &name,
                    &coordinate.url,
                    &dest_str,
                ])
                .await
            }
            // Shallow clones cannot check out an arbitrary commit
            GitRef::Commit(commit) => {
                self.exec(&["clone", "--quiet", &coordinate.url, &dest_str])
                    .await?;
                self.exec(&["-C", &dest_str, "checkout", "--quiet", &commit])
                    .await
            }
        }
    }
}

//! External build process invocation

use crate::error::{CoonError, CoonResult};
use crate::package::Package;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Lines of build output kept in a failure report
const OUTPUT_TAIL: usize = 40;

/// Runs a package's build command
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run `command` inside `dir` to build `pack`
    async fn run(&self, pack: &Package, command: &[String], dir: &Path) -> CoonResult<()>;
}

/// Spawns the build command as a child process
#[derive(Debug, Default)]
pub struct ProcessRunner;

#[async_trait]
impl BuildRunner for ProcessRunner {
    async fn run(&self, pack: &Package, command: &[String], dir: &Path) -> CoonResult<()> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CoonError::User(format!("{} has an empty build command", pack.name)))?;
        debug!("Executing in {}: {} {:?}", dir.display(), program, args);

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CoonError::command_failed(command.join(" "), e))?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(CoonError::Build {
            package: pack.name.clone(),
            output: tail(&combined, OUTPUT_TAIL),
        })
    }
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

//! Tool downloads

use crate::error::{CoonError, CoonResult};
use crate::store::write_atomic;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use ureq::Agent;

/// Retrieves a tool binary from a URL
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`
    async fn download(&self, tool: &str, url: &str, dest: &Path) -> CoonResult<()>;
}

/// Plain HTTP(S) downloads
pub struct HttpDownloader {
    agent: Agent,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, tool: &str, url: &str, dest: &Path) -> CoonResult<()> {
        info!("Downloading {} from {}", tool, url);

        let agent = self.agent.clone();
        let target = url.to_string();
        let result = tokio::task::spawn_blocking(move || -> Result<(u16, Vec<u8>), ureq::Error> {
            let mut response = agent.get(&target).call()?;
            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                return Ok((status, Vec::new()));
            }
            let body = response.body_mut().with_config().limit(u64::MAX).read_to_vec()?;
            Ok((status, body))
        })
        .await
        .map_err(|e| CoonError::Internal(format!("download task failed: {}", e)))?;

        let (status, body) = result.map_err(|e| CoonError::tool(tool, e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(CoonError::tool(
                tool,
                format!("{} returned HTTP {}", url, status),
            ));
        }

        write_atomic(dest, &body)
            .await
            .map_err(|e| CoonError::io(format!("writing {}", dest.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unreachable_source_is_tool_error() {
        let temp = TempDir::new().unwrap();
        let downloader = HttpDownloader::new(Duration::from_secs(5));
        let err = downloader
            .download("rebar3", "http://127.0.0.1:1/rebar3", &temp.path().join("rebar3"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ToolProvisionError");
        assert!(!temp.path().join("rebar3").exists());
    }
}

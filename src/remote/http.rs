//! HTTP artifact repository backend
//!
//! Maps the backend operations onto path-addressed requests against an
//! Artifactory-style repository:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | exists | `HEAD {ns}/{name}/{version}/{runtime}/{name}.cp` |
//! | fetch | `GET` same path |
//! | mkdir | `PUT {ns}/{name}/{version}/{runtime}/` |
//! | upload | `PUT` artifact path with a sha256 checksum header |
//! | versions | `GET {ns}/{name}/versions.json` |
//!
//! Requests are blocking and run on the blocking pool; every transport
//! failure becomes [`CoonError::BackendUnavailable`].

use crate::error::{CoonError, CoonResult};
use crate::package::Package;
use crate::remote::{
    artifact_location, lookup_namespaces, publish_namespace, validate_qualified, version_dir,
    CacheKind, RemoteBackend, VersionIndex, VERSION_INDEX,
};
use crate::store::write_atomic;
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use ureq::{Agent, RequestBuilder};

/// How to authenticate against the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Anonymous,
    Basic { username: String, password: String },
    Token(String),
}

impl Credentials {
    fn header(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => Some(format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{}:{}", username, password))
            )),
            Self::Token(token) => Some(format!("Bearer {}", token)),
        }
    }

    fn account(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } => Some(username),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Head,
    Get,
    Put,
}

struct Reply {
    status: u16,
    body: Vec<u8>,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote backend over an HTTP artifact repository
pub struct HttpBackend {
    name: String,
    base: url::Url,
    credentials: Credentials,
    runtime: String,
    namespace: Option<String>,
    agent: Agent,
    index_lock: tokio::sync::Mutex<()>,
}

impl HttpBackend {
    /// Create a backend for the repository at `base_url`
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        credentials: Credentials,
        runtime: impl Into<String>,
        timeout: Duration,
    ) -> CoonResult<Self> {
        let name = name.into();
        let parsed = url::Url::parse(base_url).map_err(|e| CoonError::ConfigInvalid {
            path: format!("cache.{}", name).into(),
            reason: format!("invalid url '{}': {}", base_url, e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoonError::ConfigInvalid {
                path: format!("cache.{}", name).into(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        Ok(Self {
            name,
            base: parsed,
            credentials,
            runtime: runtime.into(),
            namespace: None,
            agent: Agent::new_with_config(config),
            index_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Override the publish namespace
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Absolute URL for a repository path; every segment is percent-encoded
    fn url(&self, path: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|seg| !seg.is_empty()));
        }
        url.to_string()
    }

    /// Perform one request on the blocking pool
    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
        headers: Vec<(&'static str, String)>,
    ) -> CoonResult<Reply> {
        let agent = self.agent.clone();
        let auth = self.credentials.header();
        let name = self.name.clone();
        debug!("{:?} {}", method, url);

        let result = tokio::task::spawn_blocking(move || -> Result<Reply, ureq::Error> {
            let with_headers = |req| authorize(req, auth.as_deref(), &headers);
            let mut response = match method {
                Method::Head => with_headers(agent.head(&url)).call()?,
                Method::Get => with_headers(agent.get(&url)).call()?,
                Method::Put => {
                    let req = authorize(agent.put(&url), auth.as_deref(), &headers);
                    match &body {
                        Some(bytes) => req.send(&bytes[..])?,
                        None => req.send_empty()?,
                    }
                }
            };
            let status = response.status().as_u16();
            let body = if matches!(method, Method::Get) && (200..300).contains(&status) {
                response.body_mut().with_config().limit(u64::MAX).read_to_vec()?
            } else {
                Vec::new()
            };
            Ok(Reply { status, body })
        })
        .await
        .map_err(|e| CoonError::Internal(format!("http task failed: {}", e)))?;

        result.map_err(|e| CoonError::backend_unavailable(name, e.to_string()))
    }

    fn refused(&self, what: &str, status: u16) -> CoonError {
        CoonError::backend_unavailable(&self.name, format!("{} returned HTTP {}", what, status))
    }

    /// First artifact URL answering HEAD with success
    async fn locate(&self, pack: &Package) -> CoonResult<Option<String>> {
        for namespace in lookup_namespaces(pack, self.account()) {
            let url = self.url(&artifact_location(&namespace, pack, &self.runtime));
            let reply = self.send(Method::Head, url.clone(), None, Vec::new()).await?;
            match reply.status {
                s if (200..300).contains(&s) => return Ok(Some(url)),
                404 => continue,
                s => return Err(self.refused(&url, s)),
            }
        }
        Ok(None)
    }

    async fn read_index(&self, qualified: &str) -> CoonResult<VersionIndex> {
        let url = self.url(&format!("{}/{}", qualified, VERSION_INDEX));
        let reply = self.send(Method::Get, url.clone(), None, Vec::new()).await?;
        match reply.status {
            404 => Ok(VersionIndex::default()),
            _ if reply.is_success() => VersionIndex::parse(&reply.body),
            s => Err(self.refused(&url, s)),
        }
    }

    /// Create the version directory unless it already exists
    async fn mkdir(&self, dir: &str) -> CoonResult<()> {
        let url = format!("{}/", self.url(dir));
        let head = self.send(Method::Head, url.clone(), None, Vec::new()).await?;
        if head.is_success() {
            return Ok(());
        }
        let reply = self.send(Method::Put, url.clone(), None, Vec::new()).await?;
        if !reply.is_success() {
            return Err(self.refused(&url, reply.status));
        }
        Ok(())
    }
}

fn authorize<B>(
    mut req: RequestBuilder<B>,
    auth: Option<&str>,
    headers: &[(&'static str, String)],
) -> RequestBuilder<B> {
    if let Some(value) = auth {
        req = req.header("Authorization", value);
    }
    for (key, value) in headers {
        req = req.header(*key, value.as_str());
    }
    req
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CacheKind {
        CacheKind::HttpRemote
    }

    fn account(&self) -> Option<&str> {
        self.namespace.as_deref().or_else(|| self.credentials.account())
    }

    async fn exists(&self, pack: &Package) -> CoonResult<bool> {
        Ok(self.locate(pack).await?.is_some())
    }

    async fn versions(&self, qualified: &str) -> CoonResult<Vec<String>> {
        validate_qualified(qualified)?;
        Ok(self.read_index(qualified).await?.names())
    }

    async fn fetch_package(&self, pack: &Package, dest: &Path) -> CoonResult<()> {
        for namespace in lookup_namespaces(pack, self.account()) {
            let url = self.url(&artifact_location(&namespace, pack, &self.runtime));
            let reply = self.send(Method::Get, url.clone(), None, Vec::new()).await?;
            match reply.status {
                404 => continue,
                _ if reply.is_success() => {
                    write_atomic(dest, &reply.body)
                        .await
                        .map_err(|e| CoonError::io(format!("writing {}", dest.display()), e))?;
                    debug!("Fetched {} from {}", url, self.name);
                    return Ok(());
                }
                s => return Err(self.refused(&url, s)),
            }
        }
        Err(CoonError::CacheMiss(format!(
            "{}@{} in {}",
            pack.qualified_name(),
            pack.version,
            self.name
        )))
    }

    async fn add_package(
        &self,
        pack: &Package,
        artifact: &Path,
        namespace: Option<&str>,
        is_public: bool,
    ) -> CoonResult<bool> {
        let payload = tokio::fs::read(artifact)
            .await
            .map_err(|e| CoonError::io(format!("reading artifact {}", artifact.display()), e))?;
        let namespace = publish_namespace(pack, namespace, self.account());

        self.mkdir(&version_dir(&namespace, pack, &self.runtime)).await?;

        let url = format!(
            "{};public={}",
            self.url(&artifact_location(&namespace, pack, &self.runtime)),
            is_public
        );
        let checksum = hex::encode(Sha256::digest(&payload));
        let reply = self
            .send(
                Method::Put,
                url.clone(),
                Some(payload),
                vec![("X-Checksum-Sha256", checksum)],
            )
            .await?;
        if !reply.is_success() {
            warn!("{} refused {}: HTTP {}", self.name, url, reply.status);
            return Ok(false);
        }

        let qualified = format!("{}/{}", namespace, pack.name);
        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index(&qualified).await?;
        if index.record(&pack.version) {
            let index_url = self.url(&format!("{}/{}", qualified, VERSION_INDEX));
            let reply = self
                .send(Method::Put, index_url.clone(), Some(index.to_json()?), Vec::new())
                .await?;
            if !reply.is_success() {
                warn!("{} refused version index {}: HTTP {}", self.name, index_url, reply.status);
            }
        }

        info!("Uploaded {} to {}", qualified, self.name);
        Ok(true)
    }
}

//! Local artifact store
//!
//! Filesystem-backed cache of built artifacts and provisioned tool binaries.
//!
//! # Layout
//!
//! | Path | Content |
//! |------|---------|
//! | `{root}/{name}/{version}/{runtime}/{name}.cp` | artifact |
//! | `{root}/{name}/{version}/{runtime}/{name}.cp.sha256` | artifact digest |
//! | `{root}/tool/{tool}` | provisioned tool binary |
//!
//! Every write lands in a uniquely named `.partial` file next to its
//! destination and is renamed into place, so readers never observe a
//! half-written entry.

pub mod lock;

use crate::error::{CoonError, CoonResult};
use crate::package::{decode_version_segment, ArtifactIdentity};
use lock::KeyedLocks;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory holding provisioned tools
pub const TOOL_DIR: &str = "tool";

/// Filesystem-backed store keyed by artifact identity
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    artifact_locks: KeyedLocks<ArtifactIdentity>,
    tool_locks: KeyedLocks<String>,
}

impl LocalStore {
    /// Create a store rooted at `root`; the directory is created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            artifact_locks: KeyedLocks::new(),
            tool_locks: KeyedLocks::new(),
        }
    }

    /// Default store location
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coon")
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the artifact for `id`
    pub fn entry_dir(&self, id: &ArtifactIdentity) -> PathBuf {
        self.root
            .join(&id.name)
            .join(id.version_segment())
            .join(&id.runtime)
    }

    /// Path of the artifact for `id`, whether or not it exists
    pub fn path_of(&self, id: &ArtifactIdentity) -> PathBuf {
        self.entry_dir(id).join(id.file_name())
    }

    fn digest_path(&self, id: &ArtifactIdentity) -> PathBuf {
        self.entry_dir(id).join(format!("{}.sha256", id.file_name()))
    }

    /// Whether an artifact is stored for `id`
    pub fn exists(&self, id: &ArtifactIdentity) -> bool {
        self.path_of(id).is_file()
    }

    /// Store `payload` under `id`, replacing any previous entry
    pub async fn put(&self, id: &ArtifactIdentity, payload: &[u8]) -> CoonResult<PathBuf> {
        let _guard = self.artifact_locks.lock(id).await;

        let path = self.path_of(id);
        let key = id.to_string();
        write_atomic(&path, payload)
            .await
            .map_err(|e| CoonError::cache_write(&key, e))?;

        let digest = hex::encode(Sha256::digest(payload));
        write_atomic(&self.digest_path(id), digest.as_bytes())
            .await
            .map_err(|e| CoonError::cache_write(&key, e))?;

        info!("Stored {} in local cache", id);
        Ok(path)
    }

    /// Store the file at `source` under `id`
    pub async fn put_file(&self, id: &ArtifactIdentity, source: &Path) -> CoonResult<PathBuf> {
        let payload = fs::read(source)
            .await
            .map_err(|e| CoonError::io(format!("reading artifact {}", source.display()), e))?;
        self.put(id, &payload).await
    }

    /// Read the artifact stored under `id`
    pub async fn get(&self, id: &ArtifactIdentity) -> CoonResult<Vec<u8>> {
        let path = self.path_of(id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoonError::CacheMiss(id.to_string()))
            }
            Err(e) => Err(CoonError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Check the stored artifact against its recorded digest.
    ///
    /// Entries written without a digest are reported as valid.
    pub async fn verify(&self, id: &ArtifactIdentity) -> CoonResult<bool> {
        let payload = self.get(id).await?;
        let expected = match fs::read_to_string(self.digest_path(id)).await {
            Ok(digest) => digest,
            Err(_) => return Ok(true),
        };
        let actual = hex::encode(Sha256::digest(&payload));
        if expected.trim() != actual {
            warn!("Digest mismatch for {}", id);
            return Ok(false);
        }
        Ok(true)
    }

    /// Remove the entry for `id`; returns whether something was removed
    pub async fn remove(&self, id: &ArtifactIdentity) -> CoonResult<bool> {
        let _guard = self.artifact_locks.lock(id).await;
        let dir = self.entry_dir(id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| CoonError::io(format!("removing {}", dir.display()), e))?;
        debug!("Removed {} from local cache", id);
        Ok(true)
    }

    /// Versions of `name` present in the store, sorted by name
    pub async fn versions(&self, name: &str) -> CoonResult<Vec<String>> {
        let dir = self.root.join(name);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoonError::io(format!("listing {}", dir.display()), e))?
        {
            if entry.path().is_dir() {
                versions.push(decode_version_segment(&entry.file_name().to_string_lossy()));
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Remove every artifact and tool
    pub async fn clear(&self) -> CoonResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| CoonError::io(format!("clearing {}", self.root.display()), e))?;
        }
        Ok(())
    }

    /// Path of a provisioned tool, whether or not it exists
    pub fn tool_path(&self, name: &str) -> PathBuf {
        self.root.join(TOOL_DIR).join(name)
    }

    /// Whether a tool binary is stored under `name`
    pub fn tool_exists(&self, name: &str) -> bool {
        self.tool_path(name).is_file()
    }

    /// Store a tool binary and mark it executable
    pub async fn put_tool(&self, name: &str, payload: &[u8]) -> CoonResult<PathBuf> {
        let _guard = self.tool_locks.lock(&name.to_string()).await;

        let path = self.tool_path(name);
        write_atomic(&path, payload)
            .await
            .map_err(|e| CoonError::cache_write(format!("{}/{}", TOOL_DIR, name), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o755);
            fs::set_permissions(&path, perms)
                .await
                .map_err(|e| CoonError::io("setting tool permissions", e))?;
        }

        info!("Stored tool {} in local cache", name);
        Ok(path)
    }

    /// Read a stored tool binary
    pub async fn get_tool(&self, name: &str) -> CoonResult<Vec<u8>> {
        let path = self.tool_path(name);
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoonError::CacheMiss(format!("{}/{}", TOOL_DIR, name))
            } else {
                CoonError::io(format!("reading {}", path.display()), e)
            }
        })
    }
}

/// Write `payload` to a unique sibling of `path`, then rename it into place
pub(crate) async fn write_atomic(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = parent.join(format!(".{}.{}.partial", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&partial, payload).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&partial, path).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e);
    }
    Ok(())
}

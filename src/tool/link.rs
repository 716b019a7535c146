//! Tool aliases
//!
//! A project refers to a cached tool through an alias named after the tool
//! in its root directory. Aliases are symbolic links where the platform has
//! them and plain copies elsewhere.

use crate::error::{CoonError, CoonResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Point `dst` at `src`, reporting whether an existing entry was changed.
///
/// | State at `dst` | Action | Returns |
/// |----------------|--------|---------|
/// | alias to `src` | none | `false` |
/// | alias elsewhere | replace | `true` |
/// | nothing | create | `false` |
/// | file or directory | replace | `true` |
///
/// Creating an alias where nothing existed is not a change. Replacement
/// renames a freshly created alias over `dst`, so concurrent readers see
/// either the old or the new entry.
pub fn link_if_needed(src: &Path, dst: &Path) -> CoonResult<bool> {
    let tool = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !src.exists() {
        return Err(CoonError::tool(
            &tool,
            format!("link source {} does not exist", src.display()),
        ));
    }

    let (changed, remove_dir) = match fs::symlink_metadata(dst) {
        Err(e) if e.kind() == ErrorKind::NotFound => (false, false),
        Err(e) => return Err(CoonError::io(format!("inspecting {}", dst.display()), e)),
        Ok(meta) if meta.file_type().is_symlink() => {
            if points_at(dst, src) {
                debug!("{} already links to {}", dst.display(), src.display());
                return Ok(false);
            }
            (true, false)
        }
        Ok(meta) if meta.is_dir() => (true, true),
        Ok(_) => {
            if !SYMLINKS && same_contents(src, dst) {
                return Ok(false);
            }
            (true, false)
        }
    };

    replace(src, dst, remove_dir)?;
    info!("Linked {} -> {}", dst.display(), src.display());
    Ok(changed)
}

#[cfg(unix)]
const SYMLINKS: bool = true;

#[cfg(not(unix))]
const SYMLINKS: bool = false;

/// Whether the symlink at `link` resolves to `src`
fn points_at(link: &Path, src: &Path) -> bool {
    let target = match fs::read_link(link) {
        Ok(target) => target,
        Err(_) => return false,
    };
    if target == src {
        return true;
    }
    let resolved = if target.is_relative() {
        link.parent().map(|p| p.join(&target)).unwrap_or(target)
    } else {
        target
    };
    match (fs::canonicalize(resolved), fs::canonicalize(src)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn replace(src: &Path, dst: &Path, remove_dir: bool) -> CoonResult<()> {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging: PathBuf =
        dst.with_file_name(format!(".{}.{}.link", name, uuid::Uuid::new_v4()));

    create_alias(src, &staging)
        .map_err(|e| CoonError::tool(&name, format!("creating alias: {}", e)))?;

    // rename cannot replace a non-empty directory
    if remove_dir {
        if let Err(e) = fs::remove_dir_all(dst) {
            let _ = fs::remove_file(&staging);
            return Err(CoonError::io(format!("removing {}", dst.display()), e));
        }
    }

    if let Err(e) = fs::rename(&staging, dst) {
        let _ = fs::remove_file(&staging);
        return Err(CoonError::io(format!("replacing {}", dst.display()), e));
    }
    Ok(())
}

#[cfg(unix)]
fn create_alias(src: &Path, at: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, at)
}

#[cfg(not(unix))]
fn create_alias(src: &Path, at: &Path) -> std::io::Result<()> {
    fs::copy(src, at).map(|_| ())
}

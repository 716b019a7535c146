//! Artifact packaging
//!
//! An artifact is an uncompressed tar holding the project manifest at its
//! root followed by every declared output directory. Member order is sorted
//! and metadata is normalised, so identical build outputs give identical
//! bytes on every machine.

use crate::error::{CoonError, CoonResult};
use crate::package::artifact_file_name;
use crate::project::{Manifest, MANIFEST_FILE};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{EntryType, Header};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Bundle `outputs` of the package at `root` into `{root}/{name}.cp`.
///
/// The manifest file is always included so consumers of the artifact can
/// read the package's own dependencies without its sources.
pub fn package(root: &Path, name: &str, outputs: &[String]) -> CoonResult<PathBuf> {
    for output in outputs {
        if !root.join(output).is_dir() {
            return Err(CoonError::packaging(
                name,
                format!("output directory {} is missing", root.join(output).display()),
            ));
        }
    }

    let bytes = archive(root, outputs).map_err(|e| CoonError::packaging(name, e.to_string()))?;

    let dest = root.join(artifact_file_name(name));
    let partial = root.join(format!(".{}.{}.partial", artifact_file_name(name), uuid::Uuid::new_v4()));
    fs::write(&partial, &bytes)
        .map_err(|e| CoonError::io(format!("writing artifact {}", partial.display()), e))?;
    fs::rename(&partial, &dest)
        .map_err(|e| CoonError::io(format!("moving artifact to {}", dest.display()), e))?;

    info!("Packaged {} ({} bytes)", dest.display(), bytes.len());
    Ok(dest)
}

/// Produce the artifact bytes for `outputs` under `root`
pub fn archive(root: &Path, outputs: &[String]) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    let manifest = root.join(MANIFEST_FILE);
    if manifest.is_file() {
        append_file(&mut builder, &manifest, Path::new(MANIFEST_FILE))?;
    }

    let mut sorted: Vec<&String> = outputs.iter().collect();
    sorted.sort();
    sorted.dedup();

    for output in sorted {
        let dir = root.join(output);
        for entry in WalkDir::new(&dir).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
            let entry = entry.map_err(std::io::Error::other)?;
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(std::io::Error::other)?
                .to_path_buf();
            let file_type = entry.file_type();
            if file_type.is_dir() {
                let mut header = normalized_header(EntryType::Directory, 0o755, 0);
                builder.append_data(&mut header, &rel, std::io::empty())?;
            } else if file_type.is_file() {
                append_file(&mut builder, entry.path(), &rel)?;
            } else if file_type.is_symlink() {
                let target = fs::read_link(entry.path())?;
                let mut header = normalized_header(EntryType::Symlink, 0o777, 0);
                builder.append_link(&mut header, &rel, &target)?;
            } else {
                debug!("Skipping special file {}", entry.path().display());
            }
        }
    }

    builder.into_inner()
}

fn append_file(
    builder: &mut tar::Builder<Vec<u8>>,
    path: &Path,
    member: &Path,
) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut header = normalized_header(EntryType::Regular, file_mode(&metadata), metadata.len());
    builder.append_data(&mut header, member, File::open(path)?)
}

fn normalized_header(kind: EntryType, mode: u32, size: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Extract artifact bytes into `dest`, rejecting members that escape it
pub fn unpack(bytes: &[u8], dest: &Path) -> CoonResult<()> {
    fs::create_dir_all(dest)
        .map_err(|e| CoonError::io(format!("creating {}", dest.display()), e))?;

    let mut archive = tar::Archive::new(bytes);
    let entries = archive
        .entries()
        .map_err(|e| CoonError::io("reading artifact", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| CoonError::io("reading artifact entry", e))?;
        let member = entry
            .path()
            .map_err(|e| CoonError::io("reading artifact member name", e))?
            .into_owned();
        if member
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(CoonError::Internal(format!(
                "artifact member {} escapes the destination",
                member.display()
            )));
        }
        entry
            .unpack_in(dest)
            .map_err(|e| CoonError::io(format!("unpacking {}", member.display()), e))?;
    }
    debug!("Unpacked artifact into {}", dest.display());
    Ok(())
}

/// Read the manifest embedded in artifact bytes
pub fn read_manifest(bytes: &[u8]) -> CoonResult<Manifest> {
    let mut archive = tar::Archive::new(bytes);
    let entries = archive
        .entries()
        .map_err(|e| CoonError::io("reading artifact", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| CoonError::io("reading artifact entry", e))?;
        let is_manifest = entry
            .path()
            .map(|p| p.as_ref() == Path::new(MANIFEST_FILE))
            .unwrap_or(false);
        if is_manifest {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| CoonError::io("reading embedded manifest", e))?;
            return Manifest::parse(&content);
        }
    }
    Err(CoonError::Internal(format!(
        "artifact has no {} member",
        MANIFEST_FILE
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectConfig;
    use tempfile::TempDir;

    fn project(dir: &Path) {
        fs::write(
            dir.join(MANIFEST_FILE),
            "[package]\nname = \"demo\"\n\n[[deps]]\nname = \"dep\"\nurl = \"https://github.com/comtihon/dep\"\ntag = \"1.0.0\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.join("ebin/nested")).unwrap();
        fs::write(dir.join("ebin/demo.beam"), b"beam").unwrap();
        fs::write(dir.join("ebin/nested/a.beam"), b"a").unwrap();
        fs::create_dir_all(dir.join("priv")).unwrap();
        fs::write(dir.join("priv/data.txt"), b"data").unwrap();
    }

    fn member_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn package_writes_artifact_with_relative_members() {
        let temp = TempDir::new().unwrap();
        project(temp.path());

        let path = package(temp.path(), "demo", &["ebin".into(), "priv".into()]).unwrap();
        assert_eq!(path, temp.path().join("demo.cp"));

        let names = member_names(&fs::read(&path).unwrap());
        assert_eq!(names[0], MANIFEST_FILE);
        assert!(names.contains(&"ebin/demo.beam".to_string()));
        assert!(names.contains(&"ebin/nested/a.beam".to_string()));
        assert!(names.contains(&"priv/data.txt".to_string()));
        assert!(names.iter().all(|n| !n.starts_with('/')));
    }

    #[test]
    fn archives_are_identical_across_locations() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        project(a.path());
        project(b.path());

        let outputs = vec!["priv".to_string(), "ebin".to_string()];
        let first = archive(a.path(), &outputs).unwrap();
        let second = archive(b.path(), &outputs).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_output_is_packaging_error() {
        let temp = TempDir::new().unwrap();
        project(temp.path());

        let err = package(temp.path(), "demo", &["ebin".into(), "include".into()]).unwrap_err();
        assert_eq!(err.kind(), "PackagingError");
        assert!(err.to_string().contains("include"));
        assert!(!temp.path().join("demo.cp").exists());
    }

    #[test]
    fn unpack_restores_outputs_and_manifest() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        project(src.path());

        let path = package(src.path(), "demo", &["ebin".into()]).unwrap();
        let bytes = fs::read(path).unwrap();
        unpack(&bytes, dst.path()).unwrap();

        assert_eq!(fs::read(dst.path().join("ebin/demo.beam")).unwrap(), b"beam");
        assert!(dst.path().join(MANIFEST_FILE).is_file());
        assert!(!dst.path().join("priv").exists());
    }

    #[test]
    fn read_manifest_from_artifact() {
        let temp = TempDir::new().unwrap();
        project(temp.path());

        let bytes = archive(temp.path(), &["ebin".to_string()]).unwrap();
        let manifest = read_manifest(&bytes).unwrap();
        assert_eq!(manifest.name(), "demo");
        assert_eq!(manifest.dependencies()[0].0, "dep");
    }
}

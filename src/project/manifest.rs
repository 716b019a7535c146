//! `coon.toml` project manifest
//!
//! ```toml
//! [package]
//! name = "test_project"
//! url = "https://github.com/comtihon/test_project"
//! tag = "1.0.0"
//! outputs = ["ebin", "priv"]
//!
//! [[deps]]
//! name = "dep"
//! url = "https://github.com/comtihon/dep"
//! tag = "1.0.0"
//! ```

use crate::compiler::Compiler;
use crate::error::{CoonError, CoonResult};
use crate::package::{validate_reference, Coordinate};
use crate::project::{ProjectConfig, DEFAULT_OUTPUT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest file name
pub const MANIFEST_FILE: &str = "coon.toml";

/// Parsed coon.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub package: PackageSection,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepEntry>,
}

/// `[package]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Vec<String>>,
}

/// One `[[deps]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepEntry {
    pub name: String,

    #[serde(flatten)]
    pub coordinate: Coordinate,
}

impl Manifest {
    /// Minimal manifest for a fresh project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            package: PackageSection {
                name: name.into(),
                url: None,
                tag: None,
                branch: None,
                commit: None,
                compiler: None,
                outputs: None,
                build: None,
            },
            deps: Vec::new(),
        }
    }

    /// Parse a manifest from a TOML file on disk
    pub async fn from_file(path: &Path) -> CoonResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoonError::io(format!("reading manifest {}", path.display()), e))?;
        Self::parse_at(&content, path)
    }

    /// Parse a manifest from a TOML string
    pub fn parse(content: &str) -> CoonResult<Self> {
        Self::parse_at(content, Path::new(MANIFEST_FILE))
    }

    fn parse_at(content: &str, path: &Path) -> CoonResult<Self> {
        let manifest: Self = toml::from_str(content).map_err(|e| CoonError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        manifest.validate(path)?;
        Ok(manifest)
    }

    fn validate(&self, path: &Path) -> CoonResult<()> {
        let invalid = |reason: String| CoonError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };
        validate_name(&self.package.name).map_err(invalid)?;
        let section = &self.package;
        for reference in [&section.tag, &section.branch, &section.commit].into_iter().flatten() {
            validate_reference(reference).map_err(invalid)?;
        }
        let mut seen = std::collections::HashSet::new();
        for dep in &self.deps {
            validate_name(&dep.name).map_err(invalid)?;
            let coordinate = &dep.coordinate;
            for reference in [&coordinate.tag, &coordinate.branch, &coordinate.commit]
                .into_iter()
                .flatten()
            {
                validate_reference(reference)
                    .map_err(|e| invalid(format!("dependency '{}': {}", dep.name, e)))?;
            }
            if !seen.insert(dep.name.as_str()) {
                return Err(invalid(format!("dependency '{}' declared twice", dep.name)));
            }
        }
        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> CoonResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the manifest into `dir`
    pub async fn save(&self, dir: &Path) -> CoonResult<()> {
        let path = dir.join(MANIFEST_FILE);
        tokio::fs::write(&path, self.to_toml()?)
            .await
            .map_err(|e| CoonError::io(format!("writing manifest {}", path.display()), e))
    }
}

/// Package names become path segments and archive member names
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("package name cannot be empty".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        || name.starts_with('.')
    {
        return Err(format!(
            "invalid package name '{}': must contain only alphanumeric characters, '-', '_' or '.'",
            name
        ));
    }
    Ok(())
}

impl ProjectConfig for Manifest {
    fn name(&self) -> &str {
        &self.package.name
    }

    fn dependencies(&self) -> Vec<(String, Coordinate)> {
        self.deps
            .iter()
            .map(|d| (d.name.clone(), d.coordinate.clone()))
            .collect()
    }

    fn origin(&self) -> Option<Coordinate> {
        let pkg = &self.package;
        if pkg.url.is_none() && pkg.tag.is_none() && pkg.branch.is_none() && pkg.commit.is_none() {
            return None;
        }
        Some(Coordinate {
            url: pkg.url.clone().unwrap_or_default(),
            branch: pkg.branch.clone(),
            tag: pkg.tag.clone(),
            commit: pkg.commit.clone(),
        })
    }

    fn compiler(&self) -> Option<Compiler> {
        self.package.compiler.as_deref().map(Compiler::parse_logged)
    }

    fn outputs(&self) -> Vec<String> {
        self.package
            .outputs
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_OUTPUT.to_string()])
    }

    fn build_command(&self) -> Option<Vec<String>> {
        self.package.build.clone().filter(|cmd| !cmd.is_empty())
    }

    fn file_name(&self) -> &'static str {
        MANIFEST_FILE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[package]
name = "test_project"
url = "https://github.com/comtihon/test_project"
tag = "1.0.0"
compiler = "rebar3"
outputs = ["ebin", "priv"]

[[deps]]
name = "dep"
url = "https://github.com/comtihon/dep"
tag = "1.0.0"

[[deps]]
name = "other"
url = "https://github.com/comtihon/other"
branch = "develop"
"#;

    #[test]
    fn escaping_references_are_rejected() {
        let escaping = r#"
[package]
name = "demo"

[[deps]]
name = "dep"
url = "https://github.com/comtihon/dep"
tag = "../../escaped"
"#;
        let err = Manifest::parse(escaping).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
        assert!(err.to_string().contains("dependency 'dep'"));

        let own = "[package]\nname = \"demo\"\nbranch = \"feature/..\"\n";
        assert!(Manifest::parse(own).is_err());

        let slashed = "[package]\nname = \"demo\"\nbranch = \"feature/x\"\n";
        assert!(Manifest::parse(slashed).is_ok());
    }

    #[test]
    fn parse_full_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.name(), "test_project");
        assert_eq!(manifest.compiler(), Some(Compiler::Rebar3));
        assert_eq!(manifest.outputs(), vec!["ebin", "priv"]);

        let deps = manifest.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].0, "dep");
        assert_eq!(deps[0].1.tag.as_deref(), Some("1.0.0"));
        assert_eq!(deps[1].1.version(), "develop");

        let origin = manifest.origin().unwrap();
        assert_eq!(origin.version(), "1.0.0");
        assert_eq!(origin.namespace().as_deref(), Some("comtihon"));
    }

    #[test]
    fn minimal_manifest_defaults() {
        let manifest = Manifest::parse("[package]\nname = \"demo\"\n").unwrap();
        assert!(manifest.origin().is_none());
        assert!(manifest.compiler().is_none());
        assert!(manifest.build_command().is_none());
        assert_eq!(manifest.outputs(), vec![DEFAULT_OUTPUT]);
    }

    #[test]
    fn rejects_missing_name() {
        let err = Manifest::parse("[package]\n").unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(Manifest::parse("[package]\nname = \"../evil\"\n").is_err());
        let dup = r#"
[package]
name = "p"
[[deps]]
name = "d"
url = "u"
[[deps]]
name = "d"
url = "v"
"#;
        let err = Manifest::parse(dup).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn unknown_compiler_falls_back() {
        let manifest =
            Manifest::parse("[package]\nname = \"demo\"\ncompiler = \"mix\"\n").unwrap();
        assert_eq!(manifest.compiler(), Some(Compiler::Coon));
    }

    #[tokio::test]
    async fn save_and_reload() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut manifest = Manifest::new("saved");
        manifest.deps.push(DepEntry {
            name: "dep".to_string(),
            coordinate: Coordinate::tagged("https://github.com/comtihon/dep", "1.0.0"),
        });
        manifest.save(temp.path()).await.unwrap();

        let loaded = Manifest::from_file(&temp.path().join(MANIFEST_FILE))
            .await
            .unwrap();
        assert_eq!(loaded.name(), "saved");
        assert_eq!(loaded.dependencies()[0].1.version(), "1.0.0");
    }
}

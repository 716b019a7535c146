//! Project configuration readers
//!
//! Each build-tool flavor has its own configuration file. The core only needs
//! the package name and its declared dependencies; everything else has a
//! default.

pub mod manifest;

pub use manifest::{Manifest, MANIFEST_FILE};

use crate::compiler::Compiler;
use crate::error::{CoonError, CoonResult};
use crate::package::Coordinate;
use std::fmt::Debug;
use std::path::Path;

/// Output directory used when a project declares none
pub const DEFAULT_OUTPUT: &str = "ebin";

/// What the core reads from a project's configuration file
pub trait ProjectConfig: Debug + Send + Sync {
    /// Package name
    fn name(&self) -> &str;

    /// Declared dependencies in declaration order
    fn dependencies(&self) -> Vec<(String, Coordinate)>;

    /// Where the project itself is published from
    fn origin(&self) -> Option<Coordinate> {
        None
    }

    /// Compiler requested by the project
    fn compiler(&self) -> Option<Compiler> {
        None
    }

    /// Build output directories
    fn outputs(&self) -> Vec<String> {
        vec![DEFAULT_OUTPUT.to_string()]
    }

    /// Explicit build command
    fn build_command(&self) -> Option<Vec<String>> {
        None
    }

    /// File name of the configuration, relative to the project root
    fn file_name(&self) -> &'static str;
}

/// Whether a directory holds a recognised project configuration
pub fn has_project(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file()
}

/// Read the project configuration in `dir`
pub async fn read_project(dir: &Path) -> CoonResult<Box<dyn ProjectConfig>> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        return Ok(Box::new(Manifest::from_file(&manifest_path).await?));
    }
    Err(CoonError::ConfigNotFound(manifest_path))
}

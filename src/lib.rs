//! Coon - dependency-aware build and package manager
//!
//! Resolves a project's pinned dependencies, builds them in order and
//! packages the results as versioned artifacts, shared through a local
//! store and any number of remote caches.

pub mod build;
pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod package;
pub mod project;
pub mod remote;
pub mod resolve;
pub mod store;
pub mod tool;
pub mod ui;

pub use error::{CoonError, CoonResult};

//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Coon - dependency-aware build and package manager
///
/// Resolves, builds and packages projects and their pinned dependencies,
/// caching artifacts locally and in remote artifact stores.
#[derive(Parser, Debug)]
#[command(name = "coon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "COON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long = "project", global = true)]
    pub project: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new project
    Create(CreateArgs),

    /// Resolve and fetch all dependencies
    Populate,

    /// Build dependencies and the project
    Build,

    /// Package build outputs into an artifact
    Package,

    /// Publish the project artifact to a remote cache
    #[command(visible_alias = "add")]
    Publish(PublishArgs),

    /// Fetch a published package and its dependencies into the local cache
    Fetch(FetchArgs),

    /// List published versions of a package
    Versions(VersionsArgs),
}

/// Arguments for the create command
#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Project name, also the directory created
    pub name: String,
}

/// Arguments for the publish command
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Name of the configured remote cache
    pub backend: String,

    /// Also publish every transitive dependency
    #[arg(short, long)]
    pub recursive: bool,

    /// Also publish direct dependencies
    #[arg(long)]
    pub with_deps: bool,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Package as namespace/name
    pub package: String,

    /// Version to fetch
    #[arg(value_name = "VERSION")]
    pub vsn: String,
}

/// Arguments for the versions command
#[derive(Parser, Debug)]
pub struct VersionsArgs {
    /// Name of the configured remote cache
    pub backend: String,

    /// Package as namespace/name
    pub package: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn add_is_publish() {
        let cli = Cli::parse_from(["coon", "add", "artifactory-local", "--recursive"]);
        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.backend, "artifactory-local");
                assert!(args.recursive);
                assert!(!args.with_deps);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn fetch_takes_positional_version() {
        let cli = Cli::parse_from(["coon", "fetch", "comtihon/dep", "1.0.0"]);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.package, "comtihon/dep");
                assert_eq!(args.vsn, "1.0.0");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_options_after_verb() {
        let cli = Cli::parse_from(["coon", "build", "-vv", "-C", "/tmp/project"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.project, Some(PathBuf::from("/tmp/project")));
    }
}

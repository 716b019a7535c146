//! Build tool flavors and runtime identity detection
//!
//! The runtime identity is the third segment of every artifact key. It
//! captures the toolchain release so artifacts built against one runtime are
//! never served to another.

use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Identity used when the runtime cannot be probed
pub const UNKNOWN_RUNTIME: &str = "unknown";

/// Supported build tool flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compiler {
    /// Native build, driven by the runtime's own make
    #[default]
    Coon,
    /// rebar (legacy)
    Rebar,
    /// rebar3
    Rebar3,
    /// erlang.mk, driven through GNU make
    ErlangMk,
}

/// An external executable a compiler needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Executable name, also the alias name in the project root
    pub name: String,
    /// Where to download the binary when it is nowhere else
    pub url: Option<String>,
}

impl Compiler {
    /// Parse a compiler name, falling back to the default on unknown values.
    ///
    /// Returns the compiler and whether the fallback was taken.
    pub fn parse_or_default(name: &str) -> (Self, bool) {
        match name.trim().to_ascii_lowercase().as_str() {
            "coon" => (Self::Coon, false),
            "rebar" => (Self::Rebar, false),
            "rebar3" => (Self::Rebar3, false),
            "erlang.mk" | "erlang_mk" | "erlangmk" => (Self::ErlangMk, false),
            _ => (Self::default(), true),
        }
    }

    /// Parse a compiler name, logging a warning when the fallback is used
    pub fn parse_logged(name: &str) -> Self {
        let (compiler, fallback) = Self::parse_or_default(name);
        if fallback {
            warn!("Unknown compiler: {} will use {}", name, compiler);
        }
        compiler
    }

    /// The external tool this compiler needs, if any
    pub fn tool(&self) -> Option<ToolSpec> {
        match self {
            Self::Coon => None,
            Self::Rebar => Some(ToolSpec {
                name: "rebar".to_string(),
                url: Some("https://github.com/rebar/rebar/wiki/rebar".to_string()),
            }),
            Self::Rebar3 => Some(ToolSpec {
                name: "rebar3".to_string(),
                url: Some("https://s3.amazonaws.com/rebar3/rebar3".to_string()),
            }),
            Self::ErlangMk => Some(ToolSpec {
                name: "make".to_string(),
                url: None,
            }),
        }
    }

    /// Default build command, relative to the package directory
    pub fn default_command(&self) -> Vec<String> {
        let parts: &[&str] = match self {
            Self::Coon => &["erl", "-make"],
            Self::Rebar => &["rebar", "compile"],
            Self::Rebar3 => &["rebar3", "compile"],
            Self::ErlangMk => &["make"],
        };
        parts.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Coon => "coon",
            Self::Rebar => "rebar",
            Self::Rebar3 => "rebar3",
            Self::ErlangMk => "erlang.mk",
        };
        write!(f, "{}", name)
    }
}

/// Determine the runtime identity tag.
///
/// An explicit override wins; otherwise the installed runtime is asked for
/// its release. Probe failures degrade to [`UNKNOWN_RUNTIME`].
pub async fn detect_runtime(explicit: Option<&str>) -> String {
    if let Some(runtime) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return sanitize(runtime);
    }

    let output = Command::new("erl")
        .args([
            "-noshell",
            "-eval",
            "io:format(\"~s\", [erlang:system_info(otp_release)]), halt().",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let release = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if release.is_empty() {
                warn!("Runtime probe returned nothing, using {}", UNKNOWN_RUNTIME);
                UNKNOWN_RUNTIME.to_string()
            } else {
                debug!("Detected runtime {}", release);
                sanitize(&release)
            }
        }
        _ => {
            warn!("Cannot detect runtime version, using {}", UNKNOWN_RUNTIME);
            UNKNOWN_RUNTIME.to_string()
        }
    }
}

/// Runtime tags become path segments, keep them to one
fn sanitize(runtime: &str) -> String {
    runtime
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_compilers() {
        assert_eq!(Compiler::parse_or_default("rebar3"), (Compiler::Rebar3, false));
        assert_eq!(Compiler::parse_or_default("Rebar"), (Compiler::Rebar, false));
        assert_eq!(Compiler::parse_or_default("erlang.mk"), (Compiler::ErlangMk, false));
    }

    #[test]
    fn parse_unknown_falls_back() {
        assert_eq!(Compiler::parse_or_default("mix"), (Compiler::Coon, true));
        assert_eq!(Compiler::parse_logged("mix"), Compiler::Coon);
    }

    #[test]
    fn compiler_tools() {
        assert!(Compiler::Coon.tool().is_none());
        let rebar = Compiler::Rebar.tool().unwrap();
        assert_eq!(rebar.name, "rebar");
        assert!(rebar.url.is_some());
        assert!(Compiler::ErlangMk.tool().unwrap().url.is_none());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for compiler in [Compiler::Coon, Compiler::Rebar, Compiler::Rebar3, Compiler::ErlangMk] {
            assert_eq!(Compiler::parse_or_default(&compiler.to_string()).0, compiler);
        }
    }

    #[tokio::test]
    async fn explicit_runtime_wins() {
        assert_eq!(detect_runtime(Some("26")).await, "26");
        assert_eq!(detect_runtime(Some("otp/26")).await, "otp_26");
    }
}

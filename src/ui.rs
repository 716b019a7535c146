//! Terminal output for command results
//!
//! Uses `cliclack` spinners and log lines on an interactive terminal and
//! plain tagged lines everywhere else (pipes, CI).

use console::style;
use std::io::IsTerminal;

/// Output mode for the current process
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Detect whether stdout is an interactive terminal outside CI
    pub fn detect() -> Self {
        let ci = ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "JENKINS_URL", "BUILDKITE"]
            .iter()
            .any(|var| std::env::var_os(var).is_some());
        Self {
            interactive: std::io::stdout().is_terminal() && !ci,
        }
    }

    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.interactive {
        cliclack::log::success(message).ok();
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.interactive {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        println!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Display a warning step
pub fn step_warn(ctx: &UiContext, message: &str) {
    if ctx.interactive {
        cliclack::log::warning(message).ok();
    } else {
        println!("  {} {}", style("[WARN]").yellow(), message);
    }
}

/// Print an indented list entry
pub fn item(ctx: &UiContext, value: &str, detail: &str) {
    if ctx.interactive {
        println!("  {} {}", value, style(detail).dim());
    } else if detail.is_empty() {
        println!("  {}", value);
    } else {
        println!("  {} {}", value, detail);
    }
}

/// A spinner for one long-running step
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Start a spinner (plain progress line outside a terminal)
    pub fn start(ctx: &UiContext, message: &str) -> Self {
        let spinner = if ctx.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            Some(spinner)
        } else {
            println!("{} {}", style("...").dim(), message);
            None
        };
        Self {
            spinner,
            interactive: ctx.interactive,
        }
    }

    /// Stop with success message
    pub fn stop(mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None if self.interactive => println!("{} {}", style("✓").green(), message),
            None => println!("{} {}", style("[OK]").green(), message),
        }
    }

    /// Stop with error message
    pub fn fail(mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None if self.interactive => println!("{} {}", style("✗").red(), message),
            None => println!("{} {}", style("[FAIL]").red(), message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_does_not_panic() {
        let ctx = UiContext::non_interactive();
        assert!(!ctx.is_interactive());
        step_ok(&ctx, "Built");
        step_ok_detail(&ctx, "Packaged", "demo.cp");
        step_warn(&ctx, "Nothing to do");
        item(&ctx, "1.0.0", "");
        TaskSpinner::start(&ctx, "Fetching").stop("Fetched");
        TaskSpinner::start(&ctx, "Fetching").fail("Failed");
    }
}

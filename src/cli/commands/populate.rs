//! Populate command - resolve and fetch dependencies

use crate::build::Controller;
use crate::error::CoonResult;
use crate::package::NodeSource;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the populate command
pub async fn execute(controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let spinner = TaskSpinner::start(&ctx, "Resolving dependencies...");

    let tree = match controller.populate().await {
        Ok(tree) => tree,
        Err(e) => {
            spinner.fail("Resolution failed");
            return Err(e);
        }
    };

    let deps = tree.dependencies();
    if deps.is_empty() {
        spinner.stop("No dependencies");
        return Ok(());
    }
    spinner.stop(&format!("Resolved {} dependencies", deps.len()));

    for dep in deps {
        let source = match dep.source {
            NodeSource::Cached => "cached",
            _ => "source",
        };
        ui::item(&ctx, &format!("{}@{}", dep.name, dep.version), source);
    }
    Ok(())
}

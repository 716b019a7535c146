//! Build command - build dependencies and the project

use crate::build::Controller;
use crate::error::CoonResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the build command
pub async fn execute(controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let spinner = TaskSpinner::start(&ctx, "Building...");

    match controller.build().await {
        Ok(tree) => {
            spinner.stop(&format!("Built {}", tree.root().name));
            for pack in tree.dependencies() {
                ui::item(&ctx, &pack.name, &pack.version);
            }
            Ok(())
        }
        Err(e) => {
            spinner.fail("Build failed");
            Err(e)
        }
    }
}

//! Fetch command - install a published package into the local cache

use crate::build::Controller;
use crate::cli::args::FetchArgs;
use crate::error::CoonResult;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the fetch command
pub async fn execute(args: FetchArgs, controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let spinner = TaskSpinner::start(&ctx, &format!("Fetching {}@{}...", args.package, args.vsn));

    match controller.fetch(&args.package, &args.vsn).await {
        Ok(packages) => {
            spinner.stop(&format!("Fetched {}@{}", args.package, args.vsn));
            for pack in packages.iter().skip(1) {
                ui::item(&ctx, &pack.name, &pack.version);
            }
            Ok(())
        }
        Err(e) => {
            spinner.fail("Fetch failed");
            Err(e)
        }
    }
}

//! Versions command - list published versions

use crate::build::Controller;
use crate::cli::args::VersionsArgs;
use crate::error::CoonResult;
use crate::ui::{self, UiContext};

/// Execute the versions command
pub async fn execute(args: VersionsArgs, controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let versions = controller.versions(&args.backend, &args.package).await?;

    if versions.is_empty() {
        ui::step_warn(&ctx, &format!("No versions of {} on {}", args.package, args.backend));
        return Ok(());
    }
    for version in versions {
        ui::item(&ctx, &version, "");
    }
    Ok(())
}

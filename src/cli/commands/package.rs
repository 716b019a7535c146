//! Package command - bundle build outputs

use crate::build::Controller;
use crate::error::CoonResult;
use crate::ui::{self, UiContext};

/// Execute the package command
pub async fn execute(controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let artifact = controller.package().await?;
    ui::step_ok_detail(&ctx, "Packaged", &artifact.display().to_string());
    Ok(())
}

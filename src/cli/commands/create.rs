//! Create command - scaffold a new project

use crate::build::Controller;
use crate::cli::args::CreateArgs;
use crate::error::CoonResult;
use crate::ui::{self, UiContext};
use std::path::Path;

/// Execute the create command
pub async fn execute(args: CreateArgs, parent: &Path) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let dir = Controller::create(parent, &args.name).await?;
    ui::step_ok_detail(&ctx, "Created project", &dir.display().to_string());
    Ok(())
}

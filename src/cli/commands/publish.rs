//! Publish command - upload the project artifact to a remote cache

use crate::build::Controller;
use crate::cli::args::PublishArgs;
use crate::error::{CoonError, CoonResult};
use crate::ui::{TaskSpinner, UiContext};

/// Execute the publish command
pub async fn execute(args: PublishArgs, controller: &Controller) -> CoonResult<()> {
    let ctx = UiContext::detect();
    let spinner = TaskSpinner::start(&ctx, &format!("Publishing to {}...", args.backend));

    let published = match controller
        .add_package(&args.backend, args.recursive, args.with_deps)
        .await
    {
        Ok(published) => published,
        Err(e) => {
            spinner.fail("Publish failed");
            return Err(e);
        }
    };

    if !published {
        spinner.fail("Publish failed");
        return Err(CoonError::backend_unavailable(
            &args.backend,
            "upload was not accepted",
        ));
    }

    spinner.stop(&format!("Published to {}", args.backend));
    Ok(())
}

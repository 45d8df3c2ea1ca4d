//! One-shot polling cycle.

use htlink_core::{Coordinator, CoordinatorConfig};

use crate::cli::{GlobalOpts, ReadArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    mut config: CoordinatorConfig,
    args: ReadArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !args.params.is_empty() {
        config.selected_params = args.params;
    }

    let coordinator = Coordinator::new(config);
    let snapshot = coordinator.refresh().await?;

    let failing = snapshot.invalid_ids().count();
    if failing > 0 && !global.quiet {
        eprintln!("{failing} parameter(s) could not be read this cycle");
    }

    let out = util::render_snapshot(
        &snapshot,
        coordinator.catalog(),
        &global.output,
        output::should_color(&global.color),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

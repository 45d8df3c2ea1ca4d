//! Parameter write with confirmation.

use serde::Serialize;

use htlink_core::{Coordinator, CoordinatorConfig, ParamValue};

use crate::cli::{GlobalOpts, WriteArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct WriteResult {
    param: String,
    requested: ParamValue,
    applied: ParamValue,
    unit: Option<String>,
}

pub async fn handle(
    config: CoordinatorConfig,
    args: WriteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let coordinator = Coordinator::new(config);

    // Reject bad input before asking anything.
    let descriptor = coordinator
        .catalog()
        .get(&args.param)
        .ok_or_else(|| CliError::UnknownParameter {
            id: args.param.clone(),
        })?
        .clone();
    let value = descriptor.parse_value(&args.value)?;
    coordinator.validate_write(&descriptor.id, &value)?;

    if !coordinator.writes_permitted() {
        return Err(CliError::WritesNotPermitted {
            path: htlink_config::config_path().display().to_string(),
        });
    }

    let prompt = format!("Set {} ({}) to {value}?", descriptor.name, descriptor.id);
    if !util::confirm(&prompt, global.yes)? {
        return Ok(());
    }
    coordinator.set_writes_enabled(true)?;

    let applied = coordinator.request_write(&descriptor.id, value.clone()).await;
    coordinator.set_writes_enabled(false)?;
    let applied = applied?;

    if applied != value && !global.quiet {
        eprintln!("heat pump adjusted the value to {applied}");
    }

    let result = WriteResult {
        param: descriptor.id.clone(),
        requested: value,
        applied,
        unit: descriptor.unit.clone(),
    };
    let out = output::render_single(
        &global.output,
        &result,
        |r| match &r.unit {
            Some(unit) => format!("{} = {} {unit}", r.param, r.applied),
            None => format!("{} = {}", r.param, r.applied),
        },
        |r| r.applied.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

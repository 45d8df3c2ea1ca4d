//! Device clock.

use chrono::{NaiveDateTime, Weekday};
use serde::Serialize;

use htlink_core::{Coordinator, CoordinatorConfig, DeviceClock};

use crate::cli::{ClockArgs, ClockCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct ClockView {
    datetime: NaiveDateTime,
    weekday: String,
}

impl From<DeviceClock> for ClockView {
    fn from(clock: DeviceClock) -> Self {
        let weekday = u8::try_from(clock.weekday)
            .ok()
            .and_then(|n| Weekday::try_from(n.saturating_sub(1)).ok())
            .map_or_else(|| clock.weekday.to_string(), |d| d.to_string());
        Self {
            datetime: clock.datetime,
            weekday,
        }
    }
}

pub async fn handle(
    config: CoordinatorConfig,
    args: ClockArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let coordinator = Coordinator::new(config);

    let clock = match args.command {
        ClockCommand::Get => coordinator.device_time().await?,
        ClockCommand::Set { datetime, now: _ } => {
            let target = datetime.as_deref().map(util::parse_datetime).transpose()?;
            if !coordinator.writes_permitted() {
                return Err(CliError::WritesNotPermitted {
                    path: htlink_config::config_path().display().to_string(),
                });
            }
            let label = target.map_or_else(|| "the current local time".into(), |t| t.to_string());
            if !util::confirm(&format!("Set heat pump clock to {label}?"), global.yes)? {
                return Ok(());
            }
            coordinator.set_writes_enabled(true)?;
            let result = coordinator.set_device_time(target).await;
            coordinator.set_writes_enabled(false)?;
            result?
        }
    };

    let view = ClockView::from(clock);
    let out = output::render_single(
        &global.output,
        &view,
        |c| format!("{} ({})", c.datetime.format("%Y-%m-%d %H:%M:%S"), c.weekday),
        |c| c.datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

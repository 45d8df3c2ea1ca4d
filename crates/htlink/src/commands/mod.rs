//! Command dispatch: bridges CLI args -> coordinator operations -> output.

pub mod clock;
pub mod config_cmd;
pub mod params;
pub mod read;
pub mod util;
pub mod watch;
pub mod write;

use htlink_core::CoordinatorConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: CoordinatorConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Read(args) => read::handle(config, args, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Write(args) => write::handle(config, args, global).await,
        Command::Clock(args) => clock::handle(config, args, global).await,
        // Handled before a device config is resolved
        Command::Params(_) | Command::Config(_) | Command::Completions(_) => Err(CliError::Internal {
            message: "command does not talk to the heat pump".into(),
        }),
    }
}

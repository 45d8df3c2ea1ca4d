//! Scheduled polling until Ctrl-C.

use htlink_core::{Coordinator, CoordinatorConfig};
use tracing::info;

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    mut config: CoordinatorConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if !args.params.is_empty() {
        config.selected_params = args.params;
    }
    if let Some(interval) = args.interval {
        config.scan_interval = interval;
    }

    let coordinator = Coordinator::new(config);
    let mut snapshots = coordinator.subscribe();
    let mut health = coordinator.subscribe_health();
    let mut was_available = health.borrow().available;
    let color = output::should_color(&global.color);

    coordinator.spawn_polling();
    if !global.quiet {
        eprintln!(
            "Polling every {}; press Ctrl-C to stop",
            humantime::format_duration(coordinator.config().scan_interval)
        );
    }

    let mut printed = 0_u64;
    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break signal.map_err(CliError::from);
            }
            changed = health.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = health.borrow_and_update().clone();
                if current.available != was_available && !global.quiet {
                    if current.available {
                        eprintln!("heat pump available again");
                    } else {
                        eprintln!(
                            "heat pump unavailable: {}",
                            current.last_error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
                was_available = current.available;
            }
            snapshot = snapshots.changed() => {
                let Some(snapshot) = snapshot else {
                    break Ok(());
                };
                let out = util::render_snapshot(&snapshot, coordinator.catalog(), &global.output, color)?;
                output::print_output(&out, global.quiet);
                printed += 1;
                if args.count.is_some_and(|n| printed >= n) {
                    break Ok(());
                }
            }
        }
    };

    coordinator.shutdown().await;
    result
}

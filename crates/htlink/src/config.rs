//! CLI-side configuration: profile selection and flag overrides on top of
//! `htlink_config`. Core only ever sees the resulting `CoordinatorConfig`.

use htlink_config::{Config, Profile, profile_to_coordinator_config};
use htlink_core::CoordinatorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Build a `CoordinatorConfig` from the config file, profile, and CLI
/// overrides (flag > env > profile > defaults).
pub fn build_coordinator_config(global: &GlobalOpts) -> Result<CoordinatorConfig, CliError> {
    let cfg = htlink_config::load_config()?;
    resolve(&cfg, global)
}

fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<CoordinatorConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: cfg.available_profiles(),
            });
        }
        None => {
            let host = global.host.clone().ok_or_else(|| CliError::NoConfig {
                path: htlink_config::config_path().display().to_string(),
            })?;
            Profile::new(host)
        }
    };

    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    tracing::debug!(profile = %profile_name, host = %profile.host, port = profile.port, "resolved profile");
    Ok(profile_to_coordinator_config(&profile, &cfg.defaults)?)
}

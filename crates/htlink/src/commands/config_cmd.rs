//! Config subcommand handlers.

use dialoguer::{Confirm, Input};

use htlink_config::{self as config_file, Profile};
use htlink_core::config::{DEFAULT_PORT, DEFAULT_SCAN_INTERVAL};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = config_file::load_config()?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("<unrenderable: {e}>")),
                |_| config_file::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config_file::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config_file::load_config()?;
            let default = config::active_profile_name(global, &cfg);
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: htlink config init");
                return Ok(());
            }
            let lines: Vec<String> = cfg
                .profiles
                .iter()
                .map(|(name, p)| {
                    let marker = if *name == default { " *" } else { "" };
                    match global.output {
                        OutputFormat::Plain => name.clone(),
                        _ => format!("{name}{marker}  {}:{}", p.host, p.port),
                    }
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config_file::load_config()?;
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            config_file::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let mut cfg = config_file::load_config_or_default();
    let config_path = config_file::config_path();
    eprintln!("htlink configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let host: String = Input::new()
        .with_prompt("Heat pump host or IP")
        .interact_text()
        .map_err(prompt_err)?;
    if host.trim().is_empty() {
        return Err(CliError::Validation {
            field: "host".into(),
            reason: "host cannot be empty".into(),
        });
    }

    let port: u16 = Input::new()
        .with_prompt("TCP port")
        .default(DEFAULT_PORT)
        .interact_text()
        .map_err(prompt_err)?;

    let scan_interval: u64 = Input::new()
        .with_prompt("Scan interval (seconds)")
        .default(DEFAULT_SCAN_INTERVAL.as_secs())
        .interact_text()
        .map_err(prompt_err)?;

    let write_enabled = Confirm::new()
        .with_prompt("Allow writing settings to the heat pump?")
        .default(false)
        .interact()
        .map_err(prompt_err)?;

    let profile = Profile {
        port,
        scan_interval: Some(scan_interval),
        write_enabled,
        ..Profile::new(host.trim())
    };
    // Check the profile before persisting it.
    config_file::profile_to_coordinator_config(&profile, &cfg.defaults)?;

    cfg.profiles.insert(profile_name.clone(), profile);
    if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(profile_name.clone());
    }
    let path = config_file::save_config(&cfg)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Profile: {profile_name}");
    eprintln!("\n  Test it: htlink read");
    Ok(())
}

//! Shared helpers for command handlers.

use std::io::IsTerminal;

use chrono::NaiveDateTime;

use htlink_core::{Catalog, ParameterSnapshot};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Parse `YYYY-MM-DD HH:MM:SS` (a `T` separator and omitted seconds are
/// accepted too).
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, CliError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let input = input.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| CliError::Validation {
            field: "datetime".into(),
            reason: format!("expected YYYY-MM-DD HH:MM:SS, got '{input}'"),
        })
}

// ── Snapshot rendering ───────────────────────────────────────────────

/// One snapshot entry, flattened for output.
#[derive(Debug, Serialize)]
pub struct EntryView {
    pub id: String,
    pub name: String,
    pub value: Option<htlink_core::ParamValue>,
    pub unit: Option<String>,
    pub validity: htlink_core::Validity,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Parameter")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Status")]
    validity: String,
    #[tabled(rename = "Read at")]
    timestamp: String,
}

pub fn entry_views(snapshot: &ParameterSnapshot, catalog: &Catalog) -> Vec<EntryView> {
    snapshot
        .entries
        .iter()
        .map(|(id, entry)| {
            let desc = catalog.get(id);
            EntryView {
                id: id.clone(),
                name: desc.map(|d| d.name.clone()).unwrap_or_default(),
                value: entry.value.clone(),
                unit: desc.and_then(|d| d.unit.clone()),
                validity: entry.validity,
                timestamp: entry.timestamp,
            }
        })
        .collect()
}

pub fn format_value(view: &EntryView) -> String {
    match (&view.value, &view.unit) {
        (Some(value), Some(unit)) => format!("{value} {unit}"),
        (Some(value), None) => value.to_string(),
        (None, _) => "-".into(),
    }
}

pub fn render_snapshot(
    snapshot: &ParameterSnapshot,
    catalog: &Catalog,
    format: &crate::cli::OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    let views = entry_views(snapshot, catalog);
    output::render_list(
        format,
        &views,
        |v| EntryRow {
            id: v.id.clone(),
            name: v.name.clone(),
            value: format_value(v),
            validity: output::validity_label(v.validity, color),
            timestamp: v.timestamp.map_or_else(
                || "-".into(),
                |ts| ts.with_timezone(&chrono::Local).format("%H:%M:%S").to_string(),
            ),
        },
        |v| match &v.value {
            Some(value) => format!("{}={value}", v.id),
            None => format!("{}=", v.id),
        },
    )
}

//! Catalog listing.

use std::str::FromStr;

use tabled::Tabled;

use htlink_core::{Catalog, Category, Limits, ParameterDescriptor, QueryClass};

use crate::cli::{GlobalOpts, ParamsArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ParamRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Register")]
    register: String,
    #[tabled(rename = "Access")]
    access: String,
    #[tabled(rename = "Limits")]
    limits: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

impl From<&ParameterDescriptor> for ParamRow {
    fn from(d: &ParameterDescriptor) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            class: d.class.to_string(),
            register: d.register().to_string(),
            access: d.access.to_string(),
            limits: describe_limits(&d.limits),
            unit: d.unit.clone().unwrap_or_default(),
        }
    }
}

fn describe_limits(limits: &Limits) -> String {
    match limits {
        Limits::None => String::new(),
        Limits::Range { min, max, step } => match step {
            Some(step) => format!("{min}..={max} (step {step})"),
            None => format!("{min}..={max}"),
        },
        Limits::Choices(choices) => choices
            .iter()
            .map(|c| format!("{}={}", c.value, c.label))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn parse_filter<T: FromStr>(field: &str, value: Option<&str>, valid: &str) -> Result<Option<T>, CliError> {
    value
        .map(|v| {
            T::from_str(v).map_err(|_| CliError::Validation {
                field: field.into(),
                reason: format!("expected one of {valid}, got '{v}'"),
            })
        })
        .transpose()
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &ParamsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let class: Option<QueryClass> = parse_filter("class", args.class.as_deref(), "bulk, individual")?;
    let category: Option<Category> = parse_filter(
        "category",
        args.category.as_deref(),
        "temperature, pressure, status, setpoint, operating_mode, statistics",
    )?;

    let catalog = Catalog::builtin();
    let selected: Vec<&ParameterDescriptor> = catalog
        .all()
        .iter()
        .filter(|d| class.is_none_or(|c| d.class == c))
        .filter(|d| category.is_none_or(|c| d.category == c))
        .filter(|d| !args.writable || d.is_writable())
        .collect();

    let out = output::render_list(
        &global.output,
        &selected,
        |d| ParamRow::from(*d),
        |d| d.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

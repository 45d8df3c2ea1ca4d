// ── Parameter descriptors ──
//
// Static description of one device parameter plus the conversions
// between its typed value and the raw integer carried on the wire.

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use htlink_proto::Register;

use crate::error::{CatalogError, WriteRejection};
use crate::value::{Choice, ParamValue};

/// How a parameter is fetched during a polling cycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QueryClass {
    /// Fetched together with other bulk parameters in one request.
    Bulk,
    /// Fetched with its own request/response round trip.
    Individual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "kebab-case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Grouping used for listings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Category {
    Temperature,
    Pressure,
    Status,
    Setpoint,
    OperatingMode,
    Statistics,
}

/// Data kind of a parameter. `Float` values travel as fixed-point
/// integers scaled by `10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DataKind {
    Bool,
    Int,
    Float { scale: u8 },
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Limits {
    None,
    Range {
        min: f64,
        max: f64,
        /// Advisory increment for UIs; not enforced on write.
        step: Option<f64>,
    },
    Choices(Vec<Choice>),
}

/// Immutable description of one device parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub id: String,
    pub name: String,
    /// Register number on the wire.
    pub number: u16,
    pub kind: DataKind,
    pub limits: Limits,
    pub class: QueryClass,
    pub access: Access,
    pub unit: Option<String>,
    pub category: Category,
}

impl ParameterDescriptor {
    /// A read-only parameter without limits.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        class: QueryClass,
        number: u16,
        kind: DataKind,
    ) -> Self {
        let category = match kind {
            DataKind::Bool => Category::Status,
            DataKind::Enum => Category::OperatingMode,
            DataKind::Int => Category::Statistics,
            DataKind::Float { .. } => Category::Temperature,
        };
        Self {
            id: id.into(),
            name: name.into(),
            number,
            kind,
            limits: Limits::None,
            class,
            access: Access::ReadOnly,
            unit: None,
            category,
        }
    }

    pub fn read_write(mut self) -> Self {
        self.access = Access::ReadWrite;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64, step: Option<f64>) -> Self {
        self.limits = Limits::Range { min, max, step };
        self
    }

    pub fn with_choices<'a>(mut self, choices: impl IntoIterator<Item = (i64, &'a str)>) -> Self {
        self.limits = Limits::Choices(
            choices
                .into_iter()
                .map(|(value, label)| Choice {
                    value,
                    label: label.to_owned(),
                })
                .collect(),
        );
        self
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_owned());
        self
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Wire address: bulk parameters live in the measurement bank,
    /// individual ones in the settings bank.
    pub fn register(&self) -> Register {
        match self.class {
            QueryClass::Bulk => Register::mp(self.number),
            QueryClass::Individual => Register::sp(self.number),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    fn choice(&self, value: i64) -> Option<&Choice> {
        match &self.limits {
            Limits::Choices(choices) => choices.iter().find(|c| c.value == value),
            _ => None,
        }
    }

    // ── Raw <-> typed conversion ─────────────────────────────────────

    /// Decode a raw device integer according to this descriptor's kind.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn decode_raw(&self, raw: i64) -> ParamValue {
        match self.kind {
            DataKind::Bool => ParamValue::Bool(raw != 0),
            DataKind::Int => ParamValue::Int(raw),
            DataKind::Float { scale } => ParamValue::Float(raw as f64 / 10f64.powi(scale.into())),
            DataKind::Enum => ParamValue::Choice(self.choice(raw).cloned().unwrap_or(Choice {
                value: raw,
                label: raw.to_string(),
            })),
        }
    }

    /// Check type and declared limits. Step is not enforced.
    pub fn validate(&self, value: &ParamValue) -> Result<(), WriteRejection> {
        let value = self.coerce(value)?;
        match (&self.limits, &value) {
            (Limits::None, _) => Ok(()),
            (Limits::Choices(_), ParamValue::Choice(c)) => {
                if self.choice(c.value).is_some() {
                    Ok(())
                } else {
                    Err(self.out_of_range(&value, "not one of the declared options"))
                }
            }
            (Limits::Range { min, max, .. }, v) => {
                let Some(x) = v.as_f64().filter(|x| x.is_finite()) else {
                    return Err(self.out_of_range(&value, "not a finite number"));
                };
                // Tolerate binary representation noise at the bounds.
                let eps = 1e-9;
                if x < min - eps || x > max + eps {
                    Err(self.out_of_range(&value, &format!("allowed range is {min}..={max}")))
                } else {
                    Ok(())
                }
            }
            (Limits::Choices(_), _) => Err(self.out_of_range(&value, "not one of the declared options")),
        }
    }

    /// Encode a typed value into the raw device integer. Performs the same
    /// type coercion as [`validate`](Self::validate) but no limit checks.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn encode_value(&self, value: &ParamValue) -> Result<i64, WriteRejection> {
        match self.coerce(value)? {
            ParamValue::Bool(b) => Ok(i64::from(b)),
            ParamValue::Int(i) => Ok(i),
            ParamValue::Choice(c) => Ok(c.value),
            ParamValue::Float(f) => {
                let DataKind::Float { scale } = self.kind else {
                    return Err(self.out_of_range(value, "unexpected float"));
                };
                let scaled = (f * 10f64.powi(scale.into())).round();
                if scaled.is_finite() && scaled.abs() < 9.0e15 {
                    Ok(scaled as i64)
                } else {
                    Err(self.out_of_range(value, "not representable on the wire"))
                }
            }
        }
    }

    /// Parse user input (`21.5`, `on`, `heating`, `3`) into a typed value.
    pub fn parse_value(&self, input: &str) -> Result<ParamValue, WriteRejection> {
        let input = input.trim();
        let parsed = match self.kind {
            DataKind::Bool => match input.to_ascii_lowercase().as_str() {
                "1" | "on" | "true" | "yes" => Some(ParamValue::Bool(true)),
                "0" | "off" | "false" | "no" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            DataKind::Int => input.parse::<i64>().ok().map(ParamValue::Int),
            DataKind::Float { .. } => input.parse::<f64>().ok().map(ParamValue::Float),
            DataKind::Enum => {
                let by_label = match &self.limits {
                    Limits::Choices(choices) => choices
                        .iter()
                        .find(|c| c.label.eq_ignore_ascii_case(input))
                        .cloned(),
                    _ => None,
                };
                by_label
                    .map(ParamValue::Choice)
                    .or_else(|| input.parse::<i64>().ok().map(|v| self.decode_raw(v)))
            }
        };
        parsed.ok_or_else(|| WriteRejection::OutOfRange {
            id: self.id.clone(),
            value: input.to_owned(),
            reason: format!("cannot parse as {}", self.kind_name()),
        })
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            DataKind::Bool => "on/off",
            DataKind::Int => "integer",
            DataKind::Float { .. } => "number",
            DataKind::Enum => "option",
        }
    }

    /// Bring a value into this descriptor's canonical variant.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::as_conversions
    )]
    fn coerce(&self, value: &ParamValue) -> Result<ParamValue, WriteRejection> {
        let coerced = match (self.kind, value) {
            (DataKind::Bool, v) => v.as_bool().map(ParamValue::Bool),
            (DataKind::Int, ParamValue::Int(i)) => Some(ParamValue::Int(*i)),
            (DataKind::Int, ParamValue::Float(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some(ParamValue::Int(*f as i64))
            }
            (DataKind::Float { .. }, ParamValue::Float(f)) => Some(ParamValue::Float(*f)),
            (DataKind::Float { .. }, ParamValue::Int(i)) => Some(ParamValue::Float(*i as f64)),
            (DataKind::Enum, ParamValue::Choice(c)) => Some(ParamValue::Choice(c.clone())),
            (DataKind::Enum, ParamValue::Int(i)) => Some(self.decode_raw(*i)),
            _ => None,
        };
        coerced.ok_or_else(|| {
            self.out_of_range(
                value,
                &format!("expected {}, got {}", self.kind_name(), value.kind_name()),
            )
        })
    }

    fn out_of_range(&self, value: &ParamValue, reason: &str) -> WriteRejection {
        WriteRejection::OutOfRange {
            id: self.id.clone(),
            value: value.to_string(),
            reason: reason.to_owned(),
        }
    }

    /// Internal consistency of a hand-written descriptor.
    pub(crate) fn check(&self) -> Result<(), CatalogError> {
        let fail = |reason: &str| {
            Err(CatalogError::InvalidDescriptor {
                id: self.id.clone(),
                reason: reason.to_owned(),
            })
        };
        if self.id.is_empty() {
            return fail("empty identifier");
        }
        match (&self.kind, &self.limits) {
            (DataKind::Enum, Limits::Choices(c)) if !c.is_empty() => Ok(()),
            (DataKind::Enum, _) => fail("enumerated parameter needs choices"),
            (_, Limits::Choices(_)) => fail("choices are only valid for enumerated parameters"),
            (DataKind::Bool, Limits::Range { .. }) => fail("boolean parameter cannot have a range"),
            (_, Limits::Range { min, max, step }) => {
                if min > max {
                    fail("range minimum exceeds maximum")
                } else if step.is_some_and(|s| s <= 0.0) {
                    fail("step must be positive")
                } else {
                    Ok(())
                }
            }
            (_, Limits::None) => Ok(()),
        }
    }
}

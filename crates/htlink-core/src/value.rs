// ── Typed parameter values ──

use std::fmt;

use serde::Serialize;

/// One option of an enumerated parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: i64,
    pub label: String,
}

/// A decoded parameter value.
///
/// Produced by [`ParameterDescriptor::decode_raw`](crate::ParameterDescriptor::decode_raw)
/// from the device's raw integer, and accepted by the write path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Choice(Choice),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Choice(c) => Some(c.value as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Short type name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Choice(_) => "choice",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("on"),
            Self::Bool(false) => f.write_str("off"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Choice(c) => f.write_str(&c.label),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(ParamValue::Float(21.0).to_string(), "21.0");
        assert_eq!(ParamValue::Float(7.5).to_string(), "7.5");
        assert_eq!(ParamValue::Bool(true).to_string(), "on");
        let mode = ParamValue::Choice(Choice {
            value: 1,
            label: "heating".into(),
        });
        assert_eq!(mode.to_string(), "heating");
    }

    #[test]
    fn untagged_serialization() {
        assert_eq!(
            serde_json::to_string(&ParamValue::Float(7.5)).ok().as_deref(),
            Some("7.5")
        );
        assert_eq!(
            serde_json::to_string(&ParamValue::Bool(false)).ok().as_deref(),
            Some("false")
        );
    }
}

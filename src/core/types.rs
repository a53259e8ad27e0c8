use super::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Row = Vec<Value>;

/// Declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Integer,
    Real,
    Text,
    /// Boolean column stored as 0/1.
    Flag,
}

const TRUTHY: &[&str] = &["1", "y", "yes", "true", "on", "checked"];
const FALSY: &[&str] = &["", "0", "n", "no", "false", "off"];

impl FieldType {
    /// Value a freshly created record carries for a field of this type.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Integer => Value::Integer(0),
            Self::Real => Value::Float(0.0),
            Self::Text => Value::Text(String::new()),
            Self::Flag => Value::Boolean(false),
        }
    }

    /// Validate `value` against this type, converting where the conversion
    /// is lossless. The error is a human readable reason.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),

            (Self::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (Self::Integer, Value::Float(f)) => Value::Float(f)
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| format!("{} is not an integer", f)),
            (Self::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("'{}' is not an integer", s)),

            (Self::Real, Value::Float(f)) if f.is_finite() => Ok(Value::Float(f)),
            (Self::Real, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (Self::Real, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Float(f)),
                _ => Err(format!("'{}' is not a number", s)),
            },

            (Self::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (Self::Text, v @ (Value::Integer(_) | Value::Float(_))) => Ok(Value::Text(v.to_string())),

            (Self::Flag, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (Self::Flag, Value::Integer(i)) => Ok(Value::Boolean(i != 0)),
            (Self::Flag, Value::Text(s)) => {
                let lowered = s.trim().to_lowercase();
                if TRUTHY.contains(&lowered.as_str()) {
                    Ok(Value::Boolean(true))
                } else if FALSY.contains(&lowered.as_str()) {
                    Ok(Value::Boolean(false))
                } else {
                    Err(format!("'{}' is not a yes/no value", s))
                }
            }

            (ty, other) => Err(format!("{} value {} cannot be stored in a {} field", other.type_name(), other, ty)),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Real => write!(f, "REAL"),
            Self::Text => write!(f, "TEXT"),
            Self::Flag => write!(f, "FLAG"),
        }
    }
}

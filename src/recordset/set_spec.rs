use crate::core::{RecordError, Result, Value};
use crate::record::Record;
use crate::schema::EntitySchema;

/// New value for one field in a bulk update.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Assign(Value),
    /// Add to the current numeric value; NULL counts as zero.
    Increment(Value),
}

/// Assignments applied to every row of a RecordSet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetSpec {
    entries: Vec<(String, Assignment)>,
}

impl SetSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.entries.push((field.to_string(), Assignment::Assign(value.into())));
        self
    }

    pub fn increment(mut self, field: &str, delta: impl Into<Value>) -> Self {
        self.entries.push((field.to_string(), Assignment::Increment(delta.into())));
        self
    }

    /// Parse request parameters: `+=N` and `-=N` are increments, anything
    /// else is assigned as text and validated against the field type later.
    pub fn from_params<I, K, V>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut spec = Self::new();
        for (name, value) in params {
            let name = name.as_ref().trim();
            let value = value.as_ref();
            let increment = value
                .strip_prefix("+=")
                .map(|n| (n, false))
                .or_else(|| value.strip_prefix("-=").map(|n| (n, true)));

            spec = match increment {
                Some((number, negate)) => spec.increment(name, parse_delta(number, negate)?),
                None => spec.set(name, value),
            };
        }
        Ok(spec)
    }

    pub fn entries(&self) -> &[(String, Assignment)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every assignment against `schema` before any row is touched.
    pub fn validate(&self, schema: &EntitySchema) -> Result<()> {
        for (field, assignment) in &self.entries {
            let idx = schema.field_index(field)?;
            let def = &schema.fields()[idx];
            if idx == schema.key_index() || Some(idx) == schema.version_index() {
                return Err(RecordError::TypeMismatch(format!(
                    "{}.{} cannot be assigned in a bulk update",
                    schema.name(),
                    def.name
                )));
            }
            let value = match assignment {
                Assignment::Assign(value) => value,
                Assignment::Increment(delta) if def.field_type.is_numeric() => delta,
                Assignment::Increment(_) => {
                    return Err(RecordError::TypeMismatch(format!(
                        "{}.{} is a {} field and cannot be incremented",
                        schema.name(),
                        def.name,
                        def.field_type
                    )));
                }
            };
            def.field_type
                .coerce(value.clone())
                .map_err(|reason| RecordError::TypeMismatch(format!("{}.{}: {}", schema.name(), def.name, reason)))?;
        }
        Ok(())
    }

    pub(crate) fn apply(&self, record: &mut Record) -> Result<()> {
        for (field, assignment) in &self.entries {
            match assignment {
                Assignment::Assign(value) => record.set(field, value.clone())?,
                Assignment::Increment(delta) => {
                    let next = add(record.get(field)?, delta);
                    record.set(field, next)?;
                }
            }
        }
        Ok(())
    }
}

fn parse_delta(number: &str, negate: bool) -> Result<Value> {
    let number = number.trim();
    let out_of_range = || RecordError::TypeMismatch(format!("'{}' is out of range", number));
    let value = if let Ok(i) = number.parse::<i64>() {
        Value::Integer(if negate { i.checked_neg().ok_or_else(out_of_range)? } else { i })
    } else if let Ok(f) = number.parse::<f64>()
        && f.is_finite()
    {
        Value::Float(if negate { -f } else { f })
    } else {
        return Err(RecordError::TypeMismatch(format!("'{}' is not a number", number)));
    };
    Ok(value)
}

fn add(current: &Value, delta: &Value) -> Value {
    match (current, delta) {
        (Value::Integer(a), Value::Integer(b)) => Value::Integer(a.saturating_add(*b)),
        (Value::Null, d) => d.clone(),
        (a, b) => Value::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
    }
}

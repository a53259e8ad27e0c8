use crate::connection::config::AccessConfig;
use crate::core::{RecordError, Result, Value};
use crate::executor::SortKey;
use crate::expression::{Pattern, Predicate};
use crate::schema::{EntitySchema, FieldDef};

/// Condition on one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Exact(Value),
    /// Inclusive on both ends, compared numerically or lexically per the
    /// field type.
    Range(Value, Value),
    /// Regular expression; `^` and `$` anchor it, otherwise it matches
    /// anywhere in the value.
    Pattern(String),
}

impl Constraint {
    pub fn range(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Range(low.into(), high.into())
    }

    pub fn pattern(source: impl Into<String>) -> Self {
        Self::Pattern(source.into())
    }
}

/// Plain values are exact matches, except text starting with `^` or ending
/// with `$`, which is a pattern.
impl From<Value> for Constraint {
    fn from(value: Value) -> Self {
        match value {
            Value::Text(text) if Pattern::is_anchored(&text) => Self::Pattern(text),
            other => Self::Exact(other),
        }
    }
}

/// Constraints that must all hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGroup {
    constraints: Vec<(String, Constraint)>,
}

impl FilterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(self, field: &str, value: impl Into<Value>) -> Self {
        self.constraint(field, Constraint::from(value.into()))
    }

    pub fn range(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.constraint(field, Constraint::range(low, high))
    }

    pub fn pattern(self, field: &str, source: impl Into<String>) -> Self {
        self.constraint(field, Constraint::pattern(source))
    }

    pub fn constraint(mut self, field: &str, constraint: Constraint) -> Self {
        self.constraints.push((field.to_string(), constraint));
        self
    }

    pub fn constraints(&self) -> &[(String, Constraint)] {
        &self.constraints
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Which rows of an entity a RecordSet covers and which page of them it
/// returns.
///
/// Rows match when every common constraint holds and, if any alternative
/// groups were given, at least one group matches in full.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    common: FilterGroup,
    alternatives: Vec<FilterGroup>,
    order: Vec<String>,
    limit: Option<usize>,
    offset: usize,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.common = self.common.and(field, value);
        self
    }

    pub fn range(mut self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.common = self.common.range(field, low, high);
        self
    }

    pub fn pattern(mut self, field: &str, source: impl Into<String>) -> Self {
        self.common = self.common.pattern(field, source);
        self
    }

    pub fn constraint(mut self, field: &str, constraint: Constraint) -> Self {
        self.common = self.common.constraint(field, constraint);
        self
    }

    pub fn or_group(mut self, group: FilterGroup) -> Self {
        self.alternatives.push(group);
        self
    }

    pub fn any_of(mut self, groups: impl IntoIterator<Item = FilterGroup>) -> Self {
        self.alternatives.extend(groups);
        self
    }

    /// Comma separated field names, each optionally followed by `ASC` or
    /// `DESC`. May be called repeatedly.
    pub fn order_by(mut self, order: &str) -> Self {
        self.order.extend(
            order
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string),
        );
        self
    }

    /// Page size; 0 means unbounded.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn requested_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn requested_offset(&self) -> usize {
        self.offset
    }

    /// Build a filter from raw request parameters.
    ///
    /// `limit`, `offset` and `order` are recognized; every other name is a
    /// field. `low..high` is a range, `^`/`$` mark a pattern, anything else
    /// is an exact value. Empty values are ignored. Without a `limit`
    /// parameter the configured default page size applies.
    pub fn from_params<I, K, V>(params: I, config: &AccessConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut spec = Self::new().limit(config.default_limit);

        for (name, value) in params {
            let name = name.as_ref().trim();
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }

            match name.to_lowercase().as_str() {
                "limit" => spec.limit = Some(parse_count(name, value)?),
                "offset" => spec.offset = parse_count(name, value)?,
                "order" => spec = spec.order_by(value),
                _ => {
                    let constraint = match value.split_once("..") {
                        Some((low, high)) if !low.is_empty() && !high.is_empty() => {
                            Constraint::range(low.trim(), high.trim())
                        }
                        _ => Constraint::from(Value::from(value)),
                    };
                    spec = spec.constraint(name, constraint);
                }
            }
        }

        Ok(spec)
    }

    /// Fields named anywhere in the filter, for eager validation.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(&self.common)
            .chain(self.alternatives.iter())
            .flat_map(|group| group.constraints.iter().map(|(field, _)| field.as_str()))
    }

    pub(crate) fn compile(&self, schema: &EntitySchema, config: &AccessConfig) -> Result<CompiledFilter> {
        let common = compile_group(&self.common, schema, config)?;
        let predicate = if self.alternatives.is_empty() {
            common
        } else {
            let alternatives = self
                .alternatives
                .iter()
                .map(|group| compile_group(group, schema, config))
                .collect::<Result<Vec<_>>>()?;
            Predicate::all(vec![common, Predicate::any(alternatives)])
        };

        let mut order = Vec::with_capacity(self.order.len() + 1);
        for entry in &self.order {
            order.push(compile_order(entry, schema)?);
        }
        let key_column = schema.key_column();
        if !order.iter().any(|key: &SortKey| key.column.eq_ignore_ascii_case(key_column)) {
            order.push(SortKey::asc(key_column));
        }

        Ok(CompiledFilter {
            predicate,
            order,
            limit: self.limit.and_then(|limit| config.clamp_limit(limit)),
            offset: self.offset,
        })
    }
}

/// A filter resolved against one entity's physical columns.
#[derive(Debug, Clone)]
pub(crate) struct CompiledFilter {
    pub predicate: Predicate,
    /// Always ends with the primary key, so the order is total.
    pub order: Vec<SortKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

fn parse_count(name: &str, value: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .map_err(|_| RecordError::InvalidFilter(format!("{} must be a non-negative number, got '{}'", name, value)))
}

fn compile_group(group: &FilterGroup, schema: &EntitySchema, config: &AccessConfig) -> Result<Predicate> {
    let mut parts = Vec::with_capacity(group.constraints.len());
    for (field, constraint) in &group.constraints {
        let def = schema.field_def(field)?;
        let column = def.column.clone();
        parts.push(match constraint {
            Constraint::Exact(value) => Predicate::Eq {
                column,
                value: filter_value(def, value)?,
            },
            Constraint::Range(low, high) => Predicate::Between {
                column,
                low: filter_value(def, low)?,
                high: filter_value(def, high)?,
            },
            Constraint::Pattern(source) => Predicate::Matches {
                column,
                pattern: Pattern::compile(source, config.pattern_case_insensitive)?,
            },
        });
    }
    Ok(Predicate::all(parts))
}

fn filter_value(def: &FieldDef, value: &Value) -> Result<Value> {
    def.field_type
        .coerce(value.clone())
        .map_err(|reason| RecordError::InvalidFilter(format!("{}: {}", def.name, reason)))
}

fn compile_order(entry: &str, schema: &EntitySchema) -> Result<SortKey> {
    let mut words = entry.split_whitespace();
    let field = words.next().unwrap_or_default();
    let descending = match words.next().map(str::to_ascii_uppercase).as_deref() {
        None | Some("ASC") => false,
        Some("DESC") => true,
        Some(other) => {
            return Err(RecordError::InvalidFilter(format!("unknown sort direction '{}' for {}", other, field)));
        }
    };
    if words.next().is_some() {
        return Err(RecordError::InvalidFilter(format!("malformed order entry '{}'", entry)));
    }
    Ok(SortKey::new(schema.column_for(field)?, descending))
}

use super::Pattern;
use crate::core::{RecordError, Result, Row, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Lowercase physical column name → position in a row.
pub type ColumnIndex = HashMap<String, usize>;

/// Row predicate over physical columns, as compiled from a filter spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Eq { column: String, value: Value },
    /// Inclusive on both ends.
    Between { column: String, low: Value, high: Value },
    Matches { column: String, pattern: Pattern },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Conjunction that collapses trivial cases.
    pub fn all(mut parts: Vec<Predicate>) -> Self {
        parts.retain(|p| *p != Predicate::True);
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }

    /// Disjunction that collapses trivial cases.
    pub fn any(mut parts: Vec<Predicate>) -> Self {
        if parts.iter().any(|p| *p == Predicate::True) {
            return Self::True;
        }
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::Or(parts),
        }
    }

    pub fn evaluate(&self, row: &Row, columns: &ColumnIndex) -> Result<bool> {
        match self {
            Self::True => Ok(true),
            Self::And(parts) => {
                for part in parts {
                    if !part.evaluate(row, columns)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(parts) => {
                for part in parts {
                    if part.evaluate(row, columns)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Eq { column, value } => Ok(column_value(row, columns, column)? == value),
            Self::Between { column, low, high } => {
                let v = column_value(row, columns, column)?;
                if v.is_null() {
                    return Ok(false);
                }
                Ok(v.total_cmp(low) != Ordering::Less && v.total_cmp(high) != Ordering::Greater)
            }
            Self::Matches { column, pattern } => {
                let v = column_value(row, columns, column)?;
                Ok(v.to_match_text().is_some_and(|text| pattern.is_match(&text)))
            }
        }
    }

    /// Render as a parameterized SQL condition, appending bound values to
    /// `params` in placeholder order.
    pub fn write_sql(&self, sql: &mut String, params: &mut Vec<Value>) {
        match self {
            Self::True => sql.push_str("1 = 1"),
            Self::And(parts) | Self::Or(parts) => {
                let joiner = if matches!(self, Self::And(_)) { " AND " } else { " OR " };
                sql.push('(');
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(joiner);
                    }
                    part.write_sql(sql, params);
                }
                sql.push(')');
            }
            Self::Eq { column, value } => {
                sql.push_str(&format!("`{}` = ?", column));
                params.push(value.clone());
            }
            Self::Between { column, low, high } => {
                sql.push_str(&format!("`{}` BETWEEN ? AND ?", column));
                params.push(low.clone());
                params.push(high.clone());
            }
            Self::Matches { column, pattern } => {
                sql.push_str(&format!("`{}` REGEXP ?", column));
                params.push(Value::Text(pattern.source().to_string()));
            }
        }
    }
}

fn column_value<'r>(row: &'r Row, columns: &ColumnIndex, column: &str) -> Result<&'r Value> {
    columns
        .get(&column.to_lowercase())
        .and_then(|idx| row.get(*idx))
        .ok_or_else(|| RecordError::StorageError(format!("unknown column '{}'", column)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ColumnIndex {
        [("a".to_string(), 0), ("b".to_string(), 1), ("name".to_string(), 2)]
            .into_iter()
            .collect()
    }

    fn row(a: i64, b: i64, name: &str) -> Row {
        vec![Value::Integer(a), Value::Integer(b), Value::Text(name.into())]
    }

    #[test]
    fn test_or_of_ands() {
        let p = Predicate::any(vec![
            Predicate::all(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)]),
            Predicate::eq("a", 3),
        ]);
        let idx = index();
        assert!(p.evaluate(&row(1, 2, "x"), &idx).unwrap());
        assert!(p.evaluate(&row(3, 9, "x"), &idx).unwrap());
        assert!(!p.evaluate(&row(1, 9, "x"), &idx).unwrap());
    }

    #[test]
    fn test_between_is_inclusive() {
        let p = Predicate::Between { column: "A".into(), low: 2.into(), high: 4.into() };
        let idx = index();
        assert!(p.evaluate(&row(2, 0, ""), &idx).unwrap());
        assert!(p.evaluate(&row(4, 0, ""), &idx).unwrap());
        assert!(!p.evaluate(&row(5, 0, ""), &idx).unwrap());
    }

    #[test]
    fn test_unknown_column_is_storage_error() {
        let p = Predicate::eq("missing", 1);
        assert!(matches!(p.evaluate(&row(1, 1, ""), &index()), Err(RecordError::StorageError(_))));
    }

    #[test]
    fn test_write_sql() {
        let p = Predicate::all(vec![
            Predicate::eq("a", 1),
            Predicate::Matches { column: "name".into(), pattern: Pattern::compile("^Lot", true).unwrap() },
        ]);
        let mut sql = String::new();
        let mut params = Vec::new();
        p.write_sql(&mut sql, &mut params);
        assert_eq!(sql, "(`a` = ? AND `name` REGEXP ?)");
        assert_eq!(params, vec![Value::Integer(1), Value::Text("^Lot".into())]);
    }

    #[test]
    fn test_collapsing_constructors() {
        assert_eq!(Predicate::all(vec![]), Predicate::True);
        assert_eq!(Predicate::any(vec![Predicate::True, Predicate::eq("a", 1)]), Predicate::True);
        assert_eq!(Predicate::all(vec![Predicate::True, Predicate::eq("a", 1)]), Predicate::eq("a", 1));
    }
}

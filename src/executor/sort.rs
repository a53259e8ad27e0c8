// ============================================================================
// src/executor/sort.rs - Row ordering for record sets
// ============================================================================
//
// - Multi-column sorting on physical columns
// - Stable sort (rows equal on every key keep their storage order)
// - NULLS LAST for ASC, NULLS FIRST for DESC
//
// ============================================================================

use crate::core::{RecordError, Result, Row, Value};
use crate::expression::ColumnIndex;
use std::cmp::Ordering;

// ============================================================================
// NULL HANDLING STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    /// ASC → NULLS LAST, DESC → NULLS FIRST
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

// ============================================================================
// SORT KEY
// ============================================================================

/// One column of an ORDER BY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
    pub null_ordering: NullOrdering,
}

impl SortKey {
    pub fn new(column: impl Into<String>, descending: bool) -> Self {
        Self {
            column: column.into(),
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, false)
    }
}

// ============================================================================
// ROW COMPARATOR
// ============================================================================

/// Compares rows key by key; resolved column positions are computed once.
pub struct RowComparator {
    keys: Vec<(usize, SortKey)>,
}

impl RowComparator {
    pub fn new(sort_keys: &[SortKey], columns: &ColumnIndex) -> Result<Self> {
        let keys = sort_keys
            .iter()
            .map(|key| {
                columns
                    .get(&key.column.to_lowercase())
                    .map(|idx| (*idx, key.clone()))
                    .ok_or_else(|| {
                        RecordError::StorageError(format!("unknown sort column '{}'", key.column))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn compare(&self, row1: &Row, row2: &Row) -> Ordering {
        for (idx, key) in &self.keys {
            let ordering = compare_values(&row1[*idx], &row2[*idx], key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(value1: &Value, value2: &Value, key: &SortKey) -> Ordering {
    match (value1.is_null(), value2.is_null()) {
        (true, true) => Ordering::Equal,
        // NULL placement is absolute, not reversed by direction
        (true, false) => match key.null_ordering {
            NullOrdering::NullsFirst => Ordering::Less,
            NullOrdering::NullsLast => Ordering::Greater,
        },
        (false, true) => match key.null_ordering {
            NullOrdering::NullsFirst => Ordering::Greater,
            NullOrdering::NullsLast => Ordering::Less,
        },
        (false, false) => {
            let ordering = value1.total_cmp(value2);
            if key.descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
    }
}

// ============================================================================
// SORT EXECUTOR
// ============================================================================

pub struct SortExecutor;

impl SortExecutor {
    pub fn sort(rows: &mut [Row], sort_keys: &[SortKey], columns: &ColumnIndex) -> Result<()> {
        if rows.is_empty() || sort_keys.is_empty() {
            return Ok(());
        }

        let comparator = RowComparator::new(sort_keys, columns)?;
        rows.sort_by(|row1, row2| comparator.compare(row1, row2));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> ColumnIndex {
        [("id".to_string(), 0), ("surname".to_string(), 1)].into_iter().collect()
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![Value::Integer(1), Value::Text("Smith".into())],
            vec![Value::Integer(2), Value::Null],
            vec![Value::Integer(3), Value::Text("Brown".into())],
            vec![Value::Integer(4), Value::Text("Smith".into())],
        ]
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r[0].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_null_ordering_defaults() {
        assert_eq!(NullOrdering::default_for_direction(false), NullOrdering::NullsLast);
        assert_eq!(NullOrdering::default_for_direction(true), NullOrdering::NullsFirst);
    }

    #[test]
    fn test_ascending_with_tie_break() {
        let mut rows = rows();
        SortExecutor::sort(&mut rows, &[SortKey::asc("Surname"), SortKey::asc("id")], &columns()).unwrap();
        assert_eq!(ids(&rows), vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_descending_nulls_first() {
        let mut rows = rows();
        SortExecutor::sort(&mut rows, &[SortKey::new("surname", true), SortKey::asc("id")], &columns()).unwrap();
        assert_eq!(ids(&rows), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_unknown_sort_column() {
        let mut rows = rows();
        assert!(SortExecutor::sort(&mut rows, &[SortKey::asc("givenname")], &columns()).is_err());
    }
}

use crate::core::{RecordError, Result, Row, Value};
use crate::expression::{ColumnIndex, Predicate};
use crate::schema::EntitySchema;
use std::collections::BTreeMap;

/// Rows of one physical table keyed by their integer primary key.
///
/// Keys are assigned from a monotonically increasing counter starting at 1
/// and are never reused after a delete.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    index: ColumnIndex,
    key_index: usize,
    rows: BTreeMap<i64, Row>,
    next_key: i64,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>, key_column: &str) -> Result<Self> {
        let name = name.into();
        let index: ColumnIndex = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.to_lowercase(), i))
            .collect();
        let key_index = *index.get(&key_column.to_lowercase()).ok_or_else(|| {
            RecordError::StorageError(format!("key column '{}' not in table '{}'", key_column, name))
        })?;

        Ok(Self {
            name,
            columns,
            index,
            key_index,
            rows: BTreeMap::new(),
            next_key: 1,
        })
    }

    pub fn for_entity(schema: &EntitySchema) -> Result<Self> {
        Self::new(schema.table(), schema.columns(), schema.key_column())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self) -> &ColumnIndex {
        &self.index
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn position(&self, column: &str) -> Result<usize> {
        self.index.get(&column.to_lowercase()).copied().ok_or_else(|| {
            RecordError::StorageError(format!("unknown column '{}' in table '{}'", column, self.name))
        })
    }

    /// Insert a row; columns not listed are NULL. A positive key value in
    /// `values` is used as-is, otherwise the next key is generated.
    pub fn insert(&mut self, values: &[(String, Value)]) -> Result<i64> {
        let mut row: Row = vec![Value::Null; self.columns.len()];
        for (column, value) in values {
            let pos = self.position(column)?;
            row[pos] = value.clone();
        }

        let key = match row[self.key_index].as_i64() {
            Some(key) if key > 0 => {
                if self.rows.contains_key(&key) {
                    return Err(RecordError::StorageError(format!(
                        "duplicate primary key {} in table '{}'",
                        key, self.name
                    )));
                }
                key
            }
            _ => self.next_key,
        };
        let after = key.checked_add(1).ok_or_else(|| {
            RecordError::StorageError(format!("key {} exhausts the key space of '{}'", key, self.name))
        })?;
        self.next_key = self.next_key.max(after);
        row[self.key_index] = Value::Integer(key);

        self.rows.insert(key, row);
        Ok(key)
    }

    pub fn update(
        &mut self,
        key: i64,
        assignments: &[(String, Value)],
        expect: Option<&(String, Value)>,
    ) -> Result<u64> {
        let mut positions = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            let pos = self.position(column)?;
            if pos == self.key_index {
                return Err(RecordError::StorageError(format!(
                    "primary key of '{}' cannot be updated",
                    self.name
                )));
            }
            positions.push((pos, value));
        }
        let expected = match expect {
            Some((column, value)) => Some((self.position(column)?, value)),
            None => None,
        };

        let Some(row) = self.rows.get_mut(&key) else {
            return Ok(0);
        };
        if let Some((pos, value)) = expected
            && row[pos] != *value
        {
            return Ok(0);
        }
        for (pos, value) in positions {
            row[pos] = value.clone();
        }
        Ok(1)
    }

    pub fn delete_where(&mut self, predicate: &Predicate) -> Result<u64> {
        Ok(self.take_where(predicate)?.len() as u64)
    }

    /// Remove and return the matching rows.
    pub fn take_where(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        let doomed: Vec<i64> = self
            .scan(predicate)?
            .iter()
            .filter_map(|row| row[self.key_index].as_i64())
            .collect();
        Ok(doomed.iter().filter_map(|key| self.rows.remove(key)).collect())
    }

    pub fn get(&self, key: i64) -> Option<&Row> {
        self.rows.get(&key)
    }

    /// Put back a row exactly as it was, replacing whatever holds its key.
    pub fn restore(&mut self, row: Row) -> Result<()> {
        let key = row[self.key_index].as_i64().ok_or_else(|| {
            RecordError::StorageError(format!("restored row of '{}' has no key", self.name))
        })?;
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn remove(&mut self, key: i64) -> Option<Row> {
        self.rows.remove(&key)
    }

    /// Matching rows in primary key order.
    pub fn scan(&self, predicate: &Predicate) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for row in self.rows.values() {
            if predicate.evaluate(row, &self.index)? {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    pub fn count(&self, predicate: &Predicate) -> Result<u64> {
        let mut n = 0;
        for row in self.rows.values() {
            if predicate.evaluate(row, &self.index)? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Distinct values of `column` among matching rows, ascending.
    pub fn distinct(&self, column: &str, predicate: &Predicate) -> Result<Vec<Value>> {
        let pos = self.position(column)?;
        let mut values: Vec<Value> = self
            .scan(predicate)?
            .into_iter()
            .map(|mut row| row.swap_remove(pos))
            .collect();
        values.sort();
        values.dedup();
        Ok(values)
    }
}

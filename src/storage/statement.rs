use crate::core::Value;
use crate::executor::SortKey;
use crate::expression::Predicate;

/// A parameterized statement against one physical table.
///
/// Statements are structured values; `to_sql` renders the equivalent SQL
/// with `?` placeholders for logging and for SQL-speaking backends.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select {
        table: String,
        predicate: Predicate,
        order: Vec<SortKey>,
        /// `None` means unbounded.
        limit: Option<usize>,
        offset: usize,
    },
    Count {
        table: String,
        predicate: Predicate,
    },
    Distinct {
        table: String,
        column: String,
        predicate: Predicate,
    },
    Insert {
        table: String,
        values: Vec<(String, Value)>,
    },
    Update {
        table: String,
        key_column: String,
        key: i64,
        assignments: Vec<(String, Value)>,
        /// Extra equality the row must satisfy, for compare-and-swap.
        expect: Option<(String, Value)>,
    },
    Delete {
        table: String,
        predicate: Predicate,
    },
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Self::Select { table, .. }
            | Self::Count { table, .. }
            | Self::Distinct { table, .. }
            | Self::Insert { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. } => table,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select { .. } | Self::Count { .. } | Self::Distinct { .. })
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        match self {
            Self::Select { table, predicate, order, limit, offset } => {
                sql.push_str(&format!("SELECT * FROM `{}` WHERE ", table));
                predicate.write_sql(&mut sql, &mut params);
                if !order.is_empty() {
                    let keys: Vec<String> = order
                        .iter()
                        .map(|k| {
                            if k.descending {
                                format!("`{}` DESC", k.column)
                            } else {
                                format!("`{}`", k.column)
                            }
                        })
                        .collect();
                    sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
                }
                if let Some(limit) = limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                if *offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            Self::Count { table, predicate } => {
                sql.push_str(&format!("SELECT COUNT(*) FROM `{}` WHERE ", table));
                predicate.write_sql(&mut sql, &mut params);
            }
            Self::Distinct { table, column, predicate } => {
                sql.push_str(&format!("SELECT DISTINCT `{}` FROM `{}` WHERE ", column, table));
                predicate.write_sql(&mut sql, &mut params);
                sql.push_str(&format!(" ORDER BY `{}`", column));
            }
            Self::Insert { table, values } => {
                let columns: Vec<String> = values.iter().map(|(c, _)| format!("`{}`", c)).collect();
                let placeholders = vec!["?"; values.len()].join(", ");
                sql.push_str(&format!(
                    "INSERT INTO `{}` ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    placeholders
                ));
                params.extend(values.iter().map(|(_, v)| v.clone()));
            }
            Self::Update { table, key_column, key, assignments, expect } => {
                let sets: Vec<String> = assignments.iter().map(|(c, _)| format!("`{}` = ?", c)).collect();
                sql.push_str(&format!("UPDATE `{}` SET {} WHERE `{}` = ?", table, sets.join(", "), key_column));
                params.extend(assignments.iter().map(|(_, v)| v.clone()));
                params.push(Value::Integer(*key));
                if let Some((column, value)) = expect {
                    sql.push_str(&format!(" AND `{}` = ?", column));
                    params.push(value.clone());
                }
            }
            Self::Delete { table, predicate } => {
                sql.push_str(&format!("DELETE FROM `{}` WHERE ", table));
                predicate.write_sql(&mut sql, &mut params);
            }
        }

        (sql, params)
    }
}

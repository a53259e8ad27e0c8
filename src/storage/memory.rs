use super::{Statement, Storage, Table, TransactionId};
use crate::core::{RecordError, Result, Row, Value};
use crate::executor::SortExecutor;
use crate::result::QueryResult;
use crate::schema::SchemaRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Inverse of one write, replayed on rollback.
#[derive(Debug)]
enum Undo {
    Remove { table: String, key: i64 },
    Restore { table: String, row: Row },
}

/// Storage backed by in-process tables.
///
/// Each transaction records an undo entry per row it writes; `rollback`
/// replays them newest first, so only that transaction's own writes are
/// reverted. Transactions are not isolated from one another.
pub struct InMemoryStorage {
    /// lowercase table name → table
    tables: RwLock<HashMap<String, Table>>,
    transactions: Mutex<HashMap<TransactionId, Vec<Undo>>>,
    next_txn: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_tables(HashMap::new())
    }

    /// Storage with one empty table per registered entity.
    pub fn for_registry(registry: &SchemaRegistry) -> Result<Self> {
        let mut tables = HashMap::new();
        for schema in registry.entities() {
            let table = Table::for_entity(schema)?;
            tables.insert(table.name().to_lowercase(), table);
        }
        Ok(Self::with_tables(tables))
    }

    fn with_tables(tables: HashMap<String, Table>) -> Self {
        Self {
            tables: RwLock::new(tables),
            transactions: Mutex::new(HashMap::new()),
            next_txn: AtomicU64::new(1),
        }
    }

    async fn read(&self, statement: &Statement) -> Result<QueryResult> {
        let tables = self.tables.read().await;
        let table = lookup(&tables, statement.table())?;

        match statement {
            Statement::Select { predicate, order, limit, offset, .. } => {
                let mut rows = table.scan(predicate)?;
                SortExecutor::sort(&mut rows, order, table.column_index())?;
                let page: Vec<_> = rows
                    .into_iter()
                    .skip(*offset)
                    .take(limit.unwrap_or(usize::MAX))
                    .collect();
                Ok(QueryResult::new(table.columns().to_vec(), page))
            }
            Statement::Count { predicate, .. } => {
                let n = table.count(predicate)?;
                Ok(QueryResult::new(vec!["count".into()], vec![vec![Value::Integer(n as i64)]]))
            }
            Statement::Distinct { column, predicate, .. } => {
                let values = table.distinct(column, predicate)?;
                Ok(QueryResult::new(
                    vec![column.clone()],
                    values.into_iter().map(|v| vec![v]).collect(),
                ))
            }
            _ => Err(RecordError::StorageError("unexpected statement".into())),
        }
    }

    /// Apply a write, appending its inverse to `undo` when one is given.
    async fn write(&self, statement: &Statement, undo: Option<&mut Vec<Undo>>) -> Result<QueryResult> {
        let mut tables = self.tables.write().await;
        let table = lookup_mut(&mut tables, statement.table())?;
        let name = table.name().to_string();

        match statement {
            Statement::Insert { values, .. } => {
                let key = table.insert(values)?;
                if let Some(undo) = undo {
                    undo.push(Undo::Remove { table: name, key });
                }
                Ok(QueryResult::inserted(key))
            }
            Statement::Update { key, assignments, expect, .. } => {
                let before = table.get(*key).cloned();
                let affected = table.update(*key, assignments, expect.as_ref())?;
                if let (Some(undo), Some(row), 1) = (undo, before, affected) {
                    undo.push(Undo::Restore { table: name, row });
                }
                Ok(QueryResult::affected(affected))
            }
            Statement::Delete { predicate, .. } => {
                let removed = table.take_where(predicate)?;
                let affected = removed.len() as u64;
                if let Some(undo) = undo {
                    undo.extend(removed.into_iter().map(|row| Undo::Restore { table: name.clone(), row }));
                }
                Ok(QueryResult::affected(affected))
            }
            _ => Err(RecordError::StorageError("unexpected statement".into())),
        }
    }

    pub async fn create_table(&self, table: Table) -> Result<()> {
        let mut tables = self.tables.write().await;
        let name = table.name().to_lowercase();
        if tables.contains_key(&name) {
            return Err(RecordError::StorageError(format!("table '{}' already exists", table.name())));
        }
        tables.insert(name, table);
        Ok(())
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        self.tables.read().await.contains_key(&name.to_lowercase())
    }

    pub async fn row_count(&self, name: &str) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(lookup(&tables, name)?.row_count())
    }

    pub async fn list_tables(&self) -> Vec<String> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.values().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'t>(tables: &'t HashMap<String, Table>, name: &str) -> Result<&'t Table> {
    tables
        .get(&name.to_lowercase())
        .ok_or_else(|| RecordError::StorageError(format!("table '{}' not found", name)))
}

fn lookup_mut<'t>(tables: &'t mut HashMap<String, Table>, name: &str) -> Result<&'t mut Table> {
    tables
        .get_mut(&name.to_lowercase())
        .ok_or_else(|| RecordError::StorageError(format!("table '{}' not found", name)))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        if statement.is_read_only() {
            self.read(statement).await
        } else {
            self.write(statement, None).await
        }
    }

    async fn begin(&self) -> Result<TransactionId> {
        let txn = TransactionId(self.next_txn.fetch_add(1, Ordering::Relaxed));
        self.transactions.lock().await.insert(txn, Vec::new());
        Ok(txn)
    }

    async fn execute_in(&self, txn: TransactionId, statement: &Statement) -> Result<QueryResult> {
        if statement.is_read_only() {
            return self.read(statement).await;
        }
        let mut transactions = self.transactions.lock().await;
        let undo = transactions
            .get_mut(&txn)
            .ok_or_else(|| RecordError::StorageError(format!("{} is not active", txn)))?;
        self.write(statement, Some(undo)).await
    }

    async fn commit(&self, txn: TransactionId) -> Result<()> {
        self.transactions
            .lock()
            .await
            .remove(&txn)
            .map(|_| ())
            .ok_or_else(|| RecordError::StorageError(format!("{} is not active", txn)))
    }

    async fn rollback(&self, txn: TransactionId) -> Result<()> {
        let undo = self
            .transactions
            .lock()
            .await
            .remove(&txn)
            .ok_or_else(|| RecordError::StorageError(format!("{} is not active", txn)))?;

        let mut tables = self.tables.write().await;
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Remove { table, key } => {
                    lookup_mut(&mut tables, &table)?.remove(key);
                }
                Undo::Restore { table, row } => lookup_mut(&mut tables, &table)?.restore(row)?,
            }
        }
        Ok(())
    }
}

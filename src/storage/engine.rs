use crate::core::Result;
use crate::result::QueryResult;
use super::Statement;
use async_trait::async_trait;
use std::fmt;

/// Handle of one open transaction, issued by `Storage::begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Relational connection used by records and record sets.
///
/// Implementations execute parameterized statements; the SQL dialect, if
/// any, is theirs to choose. Several requests may share one storage, each
/// with its own transactions; rolling one back must leave the writes of
/// every other request in place.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run a statement outside any transaction.
    async fn execute(&self, statement: &Statement) -> Result<QueryResult>;

    /// Start a transaction. Statements join it through `execute_in`.
    async fn begin(&self) -> Result<TransactionId>;

    async fn execute_in(&self, txn: TransactionId, statement: &Statement) -> Result<QueryResult>;

    async fn commit(&self, txn: TransactionId) -> Result<()>;

    /// Undo the writes made through `txn`.
    async fn rollback(&self, txn: TransactionId) -> Result<()>;
}

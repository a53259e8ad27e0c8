pub mod caller;
pub mod config;

use crate::core::Result;
use crate::guard::OwnershipGuard;
use crate::result::QueryResult;
use crate::schema::{EntitySchema, SchemaRegistry};
use crate::storage::{Statement, Storage, TransactionId};
use caller::Caller;
use config::AccessConfig;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Everything one request needs to reach the data: who is asking, the
/// storage connection, the entity registry and the access settings.
///
/// Cloning is cheap; records and record sets keep their own clone.
#[derive(Clone)]
pub struct RequestContext {
    caller: Caller,
    storage: Arc<dyn Storage>,
    registry: Arc<SchemaRegistry>,
    config: Arc<AccessConfig>,
    transaction: Option<TransactionId>,
}

impl RequestContext {
    /// Context over the built-in genealogy registry with default settings.
    pub fn new(storage: Arc<dyn Storage>, caller: Caller) -> Self {
        Self {
            caller,
            storage,
            registry: Arc::clone(SchemaRegistry::global()),
            config: Arc::new(AccessConfig::default()),
            transaction: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: AccessConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Same storage, registry and settings on behalf of someone else.
    pub fn for_caller(&self, caller: Caller) -> Self {
        Self {
            caller,
            ..self.clone()
        }
    }

    /// Same request with every statement joining `txn`.
    pub fn in_transaction(&self, txn: TransactionId) -> Self {
        Self {
            transaction: Some(txn),
            ..self.clone()
        }
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn resolve(&self, entity: &str) -> Result<Arc<EntitySchema>> {
        self.registry.resolve(entity).cloned()
    }

    pub fn guard(&self) -> OwnershipGuard<'_> {
        OwnershipGuard::new(self)
    }

    /// Run one statement, inside the context's transaction if it has one,
    /// logging its SQL form.
    pub async fn execute(&self, statement: &Statement) -> Result<QueryResult> {
        let (sql, params) = statement.to_sql();
        match self.transaction {
            Some(txn) => {
                debug!(caller = %self.caller.username(), params = params.len(), %txn, "{}", sql);
                self.storage.execute_in(txn, statement).await
            }
            None => {
                debug!(caller = %self.caller.username(), params = params.len(), "{}", sql);
                self.storage.execute(statement).await
            }
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("caller", &self.caller)
            .field("config", &self.config)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Genealogy Records Library
// ============================================================================
//
// Record / RecordSet data access over the genealogy entity tables:
// entity-to-table mapping, typed single-row access, filtered and paginated
// record sets, and ownership-based authorization of every mutation.
//
// ============================================================================

pub mod core;
pub mod schema;
pub mod storage;
pub mod result;
pub mod connection;
pub mod guard;
pub mod record;
pub mod recordset;
pub mod seed;
pub mod executor;
pub mod expression;

// Re-export main types for convenience
pub use core::{FieldType, RecordError, Result, Row, Value};
pub use result::QueryResult;
pub use schema::{DeletionPolicy, EntitySchema, Ownership, Reference, SchemaRegistry};
pub use storage::{InMemoryStorage, Statement, Storage, Table, TransactionId};

// Re-export request API
pub use connection::{
    RequestContext,
    caller::{Caller, Capability},
    config::{AccessConfig, BatchMode},
};
pub use guard::OwnershipGuard;
pub use record::{DeleteMode, DeleteReport, DependentCount, Record};
pub use recordset::{
    Assignment, BulkOutcome, Constraint, FilterGroup, FilterSpec, RecordSet, RecordSetInfo, Records, SetSpec,
};

/// Request context over fresh in-memory tables for every built-in entity.
///
/// # Examples
///
/// ```
/// use genealogy_records::{Caller, FilterSpec, Record, RecordSet};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ctx = genealogy_records::in_memory(Caller::editor("jcobban"))?;
///
/// let mut location = Record::new(&ctx, "Locations")?;
/// location.set("location", "Lot 5 Con 2, Caradoc")?;
/// location.save().await?;
///
/// let set = RecordSet::new(&ctx, "Locations", &FilterSpec::new().and("location", "^Lot 5"))?;
/// assert_eq!(set.count().await?, 1);
/// # Ok(())
/// # }
/// ```
pub fn in_memory(caller: Caller) -> Result<RequestContext> {
    let storage = InMemoryStorage::for_registry(SchemaRegistry::global())?;
    Ok(RequestContext::new(std::sync::Arc::new(storage), caller))
}

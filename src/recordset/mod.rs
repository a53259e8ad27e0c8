mod filter;
mod set_spec;

pub use filter::{Constraint, FilterGroup, FilterSpec};
pub use set_spec::{Assignment, SetSpec};

use crate::connection::config::BatchMode;
use crate::connection::RequestContext;
use crate::core::{RecordError, Result, Row, Value};
use crate::executor::SortKey;
use crate::expression::Predicate;
use crate::record::{align_row, DeleteMode, Record};
use crate::schema::EntitySchema;
use crate::storage::Statement;
use filter::CompiledFilter;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Summary of a RecordSet for list pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSetInfo {
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    /// Total matching rows, ignoring limit and offset.
    pub count: u64,
    /// Rows on the current page.
    pub returned: usize,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Per-row outcome of a bulk update or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    /// Rows actually written or removed.
    pub applied: u64,
    /// Rows the ownership guard refused.
    pub denied: u64,
    /// Rows refused for their own state: still referenced, modified
    /// concurrently or already gone.
    pub blocked: u64,
}

/// Filtered, ordered, paginated view over the rows of one entity.
///
/// Nothing runs at construction beyond validation. The count and the page
/// are each fetched on first use and then kept, so repeated iteration yields
/// the same sequence; `refresh` drops them. Bulk mutations apply to every
/// matching row regardless of limit and offset.
pub struct RecordSet {
    ctx: RequestContext,
    schema: Arc<EntitySchema>,
    filter: CompiledFilter,
    count: OnceCell<u64>,
    page: OnceCell<Vec<Row>>,
}

impl RecordSet {
    /// Validate and compile `spec` for `entity`. Unknown fields fail here
    /// with `UnknownField`, before any query.
    pub fn new(ctx: &RequestContext, entity: &str, spec: &FilterSpec) -> Result<Self> {
        let schema = ctx.resolve(entity)?;
        let filter = spec.compile(&schema, ctx.config())?;
        debug!(entity = schema.name(), limit = ?filter.limit, offset = filter.offset, "record set prepared");

        Ok(Self {
            ctx: ctx.clone(),
            schema,
            filter,
            count: OnceCell::new(),
            page: OnceCell::new(),
        })
    }

    pub fn entity(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn limit(&self) -> Option<usize> {
        self.filter.limit
    }

    pub fn offset(&self) -> usize {
        self.filter.offset
    }

    /// Total number of matching rows, ignoring limit and offset.
    pub async fn count(&self) -> Result<u64> {
        self.count
            .get_or_try_init(|| async {
                let result = self
                    .ctx
                    .execute(&Statement::Count {
                        table: self.schema.table().to_string(),
                        predicate: self.filter.predicate.clone(),
                    })
                    .await?;
                Ok::<_, RecordError>(result.scalar().and_then(Value::as_i64).unwrap_or(0) as u64)
            })
            .await
            .copied()
    }

    async fn page(&self) -> Result<&[Row]> {
        let rows = self
            .page
            .get_or_try_init(|| self.select(self.filter.limit, self.filter.offset))
            .await?;
        Ok(rows.as_slice())
    }

    fn select(&self, limit: Option<usize>, offset: usize) -> impl Future<Output = Result<Vec<Row>>> + '_ {
        let statement = Statement::Select {
            table: self.schema.table().to_string(),
            predicate: self.filter.predicate.clone(),
            order: self.filter.order.clone(),
            limit,
            offset,
        };
        async move {
            let result = self.ctx.execute(&statement).await?;
            let columns = result.columns.clone();
            result
                .into_rows()
                .into_iter()
                .map(|row| align_row(&self.schema, &columns, row))
                .collect()
        }
    }

    /// The current page as records, in order. Each call starts over at the
    /// first record of the same page.
    pub async fn records(&self) -> Result<Records<'_>> {
        let rows = self.page().await?;
        Ok(Records {
            set: self,
            rows: rows.iter(),
        })
    }

    /// Number of records on the current page.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.page().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.page().await?.is_empty())
    }

    pub async fn information(&self) -> Result<RecordSetInfo> {
        Ok(RecordSetInfo {
            entity: self.schema.name().to_string(),
            table: self.schema.table().to_string(),
            primary_key: self.schema.key_column().to_string(),
            count: self.count().await?,
            returned: self.page().await?.len(),
            limit: self.filter.limit,
            offset: self.filter.offset,
        })
    }

    /// Distinct values of `field` among all matching rows, ascending.
    pub async fn get_distinct(&self, field: &str) -> Result<Vec<Value>> {
        let column = self.schema.column_for(field)?.to_string();
        let result = self
            .ctx
            .execute(&Statement::Distinct {
                table: self.schema.table().to_string(),
                column,
                predicate: self.filter.predicate.clone(),
            })
            .await?;
        Ok(result.into_rows().into_iter().filter_map(|mut row| row.pop()).collect())
    }

    /// Forget the cached count and page.
    pub fn refresh(&mut self) {
        self.count.take();
        self.page.take();
    }

    /// Apply `set` to every matching row the caller may mutate.
    ///
    /// The assignments are validated once before any row is touched.
    /// Rows the guard refuses are counted as denied and skipped.
    pub async fn update(&mut self, set: &SetSpec) -> Result<BulkOutcome> {
        set.validate(&self.schema)?;
        let outcome = self
            .in_batch(|records| async move {
                let mut outcome = BulkOutcome::default();
                for mut record in records {
                    if !record.may_mutate().await? {
                        warn!(entity = record.entity().name(), key = record.key(), "row skipped: permission denied");
                        outcome.denied += 1;
                        continue;
                    }
                    set.apply(&mut record)?;
                    match record.save().await {
                        Ok(rows) => outcome.applied += rows,
                        Err(RecordError::NotAuthorized(_)) => outcome.denied += 1,
                        Err(RecordError::Conflict(..) | RecordError::RecordDeleted(..)) => outcome.blocked += 1,
                        Err(err) => return Err(err),
                    }
                }
                Ok::<_, RecordError>(outcome)
            })
            .await?;

        info!(
            entity = self.schema.name(),
            applied = outcome.applied,
            denied = outcome.denied,
            blocked = outcome.blocked,
            "bulk update"
        );
        Ok(outcome)
    }

    /// Delete every matching row the caller may delete, leaving dependents
    /// in place.
    pub async fn delete(&mut self) -> Result<BulkOutcome> {
        self.delete_with(DeleteMode::Restrict).await
    }

    pub async fn delete_with(&mut self, mode: DeleteMode) -> Result<BulkOutcome> {
        let outcome = self
            .in_batch(|records| async move {
                let mut outcome = BulkOutcome::default();
                for mut record in records {
                    if !record.may_mutate().await? {
                        warn!(entity = record.entity().name(), key = record.key(), "row skipped: permission denied");
                        outcome.denied += 1;
                        continue;
                    }
                    match record.delete(mode).await {
                        Ok(report) => outcome.applied += report.rows,
                        Err(RecordError::NotAuthorized(_)) => outcome.denied += 1,
                        Err(RecordError::HasReferences { .. } | RecordError::RecordDeleted(..)) => {
                            outcome.blocked += 1
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok::<_, RecordError>(outcome)
            })
            .await?;

        info!(
            entity = self.schema.name(),
            applied = outcome.applied,
            denied = outcome.denied,
            blocked = outcome.blocked,
            "bulk delete"
        );
        Ok(outcome)
    }

    /// Load every matching row and run `work` over them, inside one storage
    /// transaction when the batch mode asks for it. Caches are dropped
    /// afterwards either way.
    async fn in_batch<F, Fut>(&mut self, work: F) -> Result<BulkOutcome>
    where
        F: FnOnce(Vec<Record>) -> Fut,
        Fut: Future<Output = Result<BulkOutcome>>,
    {
        let rows = self.select(None, 0).await?;
        let storage = Arc::clone(self.ctx.storage());
        let txn = match self.ctx.config().batch_mode {
            BatchMode::Transaction if self.ctx.transaction().is_none() => Some(storage.begin().await?),
            _ => None,
        };
        let ctx = match txn {
            Some(txn) => self.ctx.in_transaction(txn),
            None => self.ctx.clone(),
        };
        let records: Vec<Record> = rows
            .into_iter()
            .map(|row| Record::from_row(&ctx, Arc::clone(&self.schema), row))
            .collect();

        let result = work(records).await;
        self.refresh();

        if let Some(txn) = txn {
            match &result {
                Ok(_) => storage.commit(txn).await?,
                Err(err) => {
                    debug!(entity = self.schema.name(), error = %err, %txn, "rolling back batch");
                    storage.rollback(txn).await?;
                }
            }
        }
        result
    }

    /// Order applied to the rows, ending with the primary key.
    pub fn order(&self) -> &[SortKey] {
        &self.filter.order
    }

    pub fn predicate(&self) -> &Predicate {
        &self.filter.predicate
    }
}

/// Records of one RecordSet page, materialized one at a time.
pub struct Records<'a> {
    set: &'a RecordSet,
    rows: std::slice::Iter<'a, Row>,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rows
            .next()
            .map(|row| Record::from_row(&self.set.ctx, Arc::clone(&self.set.schema), row.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Records<'_> {}

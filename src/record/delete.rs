use super::Record;
use crate::core::{RecordError, Result, Value};
use crate::expression::Predicate;
use crate::schema::{DeletionPolicy, EntitySchema, Reference};
use crate::storage::Statement;
use serde::Serialize;
use tracing::info;

/// What `Record::delete` does about rows that refer to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Leave dependents in place and report them.
    #[default]
    Restrict,
    /// Delete reported dependents along with the record.
    Cascade,
}

/// Rows of another entity found referring to a deleted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentCount {
    pub entity: String,
    pub field: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Rows removed from the record's own table.
    pub rows: u64,
    pub dependents: Vec<DependentCount>,
    /// Dependent rows removed by `DeleteMode::Cascade`.
    pub cascaded: u64,
}

impl DeleteReport {
    /// Dependent rows left behind pointing at the deleted key.
    pub fn orphaned(&self) -> u64 {
        let found: u64 = self.dependents.iter().map(|d| d.count).sum();
        found - self.cascaded.min(found)
    }
}

impl Record {
    /// Delete the stored row.
    ///
    /// Entities whose policy requires no references fail with
    /// `HasReferences` while any exist, whatever the mode. Entities that
    /// report dependents are deleted and the dependent counts returned;
    /// `DeleteMode::Cascade` removes those dependents as well. Deleting a
    /// record that was never stored affects nothing.
    pub async fn delete(&mut self, mode: DeleteMode) -> Result<DeleteReport> {
        if self.deleted {
            return Err(self.deleted_error());
        }
        let key = match self.key() {
            Some(key) if self.exists => key,
            _ => return Ok(DeleteReport::default()),
        };

        let guard = self.ctx.guard();
        guard.check_mutate(&self.schema, key, "delete").await?;

        let mut report = DeleteReport::default();
        let mut found = Vec::new();
        for reference in self.schema.deletion_policy().references() {
            let target = self.ctx.resolve(&reference.entity)?;
            let predicate = referring_rows(&target, reference, key)?;
            let result = self
                .ctx
                .execute(&Statement::Count {
                    table: target.table().to_string(),
                    predicate: predicate.clone(),
                })
                .await?;
            let count = result.scalar().and_then(Value::as_i64).unwrap_or(0) as u64;
            if count > 0 {
                report.dependents.push(DependentCount {
                    entity: target.name().to_string(),
                    field: reference.field.clone(),
                    count,
                });
                found.push((target.table().to_string(), predicate));
            }
        }

        match self.schema.deletion_policy() {
            DeletionPolicy::RequireNoReferences(_) if !report.dependents.is_empty() => {
                return Err(RecordError::HasReferences {
                    entity: self.schema.name().to_string(),
                    key,
                    count: report.dependents.iter().map(|d| d.count).sum(),
                });
            }
            DeletionPolicy::ReportDependents(_) if mode == DeleteMode::Cascade => {
                for (table, predicate) in found {
                    let result = self.ctx.execute(&Statement::Delete { table, predicate }).await?;
                    report.cascaded += result.rows_affected;
                }
            }
            _ => {}
        }

        let result = self
            .ctx
            .execute(&Statement::Delete {
                table: self.schema.table().to_string(),
                predicate: Predicate::eq(self.schema.key_column(), key),
            })
            .await?;
        report.rows = result.rows_affected;
        guard.forget(&self.schema, key).await?;

        self.exists = false;
        self.deleted = true;
        self.dirty.clear();

        info!(
            entity = self.schema.name(),
            key,
            rows = report.rows,
            orphaned = report.orphaned(),
            cascaded = report.cascaded,
            "record deleted"
        );
        Ok(report)
    }
}

/// Rows of `target` whose reference field holds `key`, narrowed by the
/// reference's type column when the field is shared between entities.
fn referring_rows(target: &EntitySchema, reference: &Reference, key: i64) -> Result<Predicate> {
    let mut parts = vec![Predicate::eq(target.column_for(&reference.field)?, key)];
    if let Some((field, values)) = &reference.discriminator {
        let column = target.column_for(field)?;
        parts.push(Predicate::any(
            values.iter().map(|value| Predicate::eq(column, *value)).collect(),
        ));
    }
    Ok(Predicate::all(parts))
}

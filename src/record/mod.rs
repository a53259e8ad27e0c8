mod delete;

pub use delete::{DeleteMode, DeleteReport, DependentCount};

use crate::connection::RequestContext;
use crate::connection::caller::Capability;
use crate::core::{RecordError, Result, Row, Value};
use crate::executor::SortKey;
use crate::expression::Predicate;
use crate::schema::{EntitySchema, Ownership};
use crate::storage::Statement;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One row of one entity with typed field access and dirty tracking.
///
/// A record is either loaded (`exists() == true`) or provisional. A
/// provisional record is written with an INSERT on `save`; when its key field
/// holds a positive value that key is used, otherwise storage assigns one.
#[derive(Debug, Clone)]
pub struct Record {
    ctx: RequestContext,
    schema: Arc<EntitySchema>,
    values: Row,
    dirty: BTreeSet<usize>,
    exists: bool,
    deleted: bool,
}

impl Record {
    /// Fresh record with default field values.
    pub fn new(ctx: &RequestContext, entity: &str) -> Result<Self> {
        let schema = ctx.resolve(entity)?;
        Ok(Self::provisional(ctx, schema))
    }

    fn provisional(ctx: &RequestContext, schema: Arc<EntitySchema>) -> Self {
        Self {
            ctx: ctx.clone(),
            values: schema.default_row(),
            schema,
            dirty: BTreeSet::new(),
            exists: false,
            deleted: false,
        }
    }

    pub(crate) fn from_row(ctx: &RequestContext, schema: Arc<EntitySchema>, values: Row) -> Self {
        Self {
            ctx: ctx.clone(),
            schema,
            values,
            dirty: BTreeSet::new(),
            exists: true,
            deleted: false,
        }
    }

    /// Fetch a record by primary key. A missing row is not an error: the
    /// result has `exists() == false`, default values and the requested key.
    pub async fn load(ctx: &RequestContext, entity: &str, key: i64) -> Result<Self> {
        let schema = ctx.resolve(entity)?;
        let predicate = Predicate::eq(schema.key_column(), key);

        match fetch_first(ctx, &schema, predicate).await? {
            Some(values) => Ok(Self::from_row(ctx, schema, values)),
            None => {
                debug!(entity = schema.name(), key, "no such record");
                let mut record = Self::provisional(ctx, schema);
                let key_index = record.schema.key_index();
                record.values[key_index] = Value::Integer(key);
                Ok(record)
            }
        }
    }

    /// `load` for a key taken from request text; non-numeric or negative
    /// text fails with `MalformedKey`.
    pub async fn load_str(ctx: &RequestContext, entity: &str, key: &str) -> Result<Self> {
        let parsed = key
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|k| *k >= 0)
            .ok_or_else(|| RecordError::MalformedKey(key.to_string()))?;
        Self::load(ctx, entity, parsed).await
    }

    /// Fetch a record by an alternate unique field such as a source name or
    /// a temple code. When several rows match, the one with the lowest
    /// primary key is returned. When none does, the provisional record has
    /// the lookup field already set (and dirty).
    pub async fn load_by_natural_key(
        ctx: &RequestContext,
        entity: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let schema = ctx.resolve(entity)?;
        let idx = schema.field_index(field)?;
        let def = &schema.fields()[idx];
        let value = def
            .field_type
            .coerce(value.into())
            .map_err(|reason| RecordError::TypeMismatch(format!("{}.{}: {}", schema.name(), def.name, reason)))?;
        let predicate = Predicate::Eq {
            column: def.column.clone(),
            value: value.clone(),
        };

        match fetch_first(ctx, &schema, predicate).await? {
            Some(values) => Ok(Self::from_row(ctx, schema, values)),
            None => {
                let mut record = Self::provisional(ctx, schema);
                record.values[idx] = value;
                record.dirty.insert(idx);
                Ok(record)
            }
        }
    }

    pub fn entity(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Primary key, once one has been assigned.
    pub fn key(&self) -> Option<i64> {
        self.values[self.schema.key_index()].as_i64().filter(|k| *k > 0)
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Logical names of fields changed since the last load or save.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.dirty
            .iter()
            .map(|idx| self.schema.fields()[*idx].name.as_str())
            .collect()
    }

    /// (logical name, value) pairs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(|def| def.name.as_str())
            .zip(self.values.iter())
    }

    pub fn get(&self, field: &str) -> Result<&Value> {
        let idx = self.schema.field_index(field)?;
        Ok(&self.values[idx])
    }

    /// Assign a field after validating the value against its declared type.
    ///
    /// A field becomes dirty only when the coerced value differs from the
    /// current one, so assigning the value it already holds schedules no
    /// write. On `TypeMismatch` neither the value nor the dirty set changes.
    /// The primary key of a stored record cannot be changed.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        if self.deleted {
            return Err(self.deleted_error());
        }

        let idx = self.schema.field_index(field)?;
        let def = &self.schema.fields()[idx];
        let value = def
            .field_type
            .coerce(value.into())
            .map_err(|reason| RecordError::TypeMismatch(format!("{}.{}: {}", self.schema.name(), def.name, reason)))?;

        if idx == self.schema.key_index() && self.exists && value != self.values[idx] {
            return Err(RecordError::TypeMismatch(format!(
                "primary key {} of {} cannot be changed",
                def.name,
                self.schema.name()
            )));
        }

        if value != self.values[idx] {
            self.values[idx] = value;
            self.dirty.insert(idx);
        }
        Ok(())
    }

    /// Write pending changes. Returns rows affected: 1 for an insert or an
    /// update, 0 when nothing was dirty.
    pub async fn save(&mut self) -> Result<u64> {
        if self.deleted {
            return Err(self.deleted_error());
        }
        if !self.exists {
            return self.insert().await;
        }
        if self.dirty.is_empty() {
            return Ok(0);
        }
        self.update().await
    }

    async fn insert(&mut self) -> Result<u64> {
        let guard = self.ctx.guard();
        guard.check_insert(&self.schema)?;

        let key_index = self.schema.key_index();
        let version_index = self.schema.version_index();
        let values: Vec<(String, Value)> = self
            .schema
            .fields()
            .iter()
            .zip(self.values.iter())
            .enumerate()
            .filter(|(idx, (_, value))| *idx != key_index || value.as_i64().is_some_and(|k| k > 0))
            .map(|(idx, (def, value))| {
                let value = if Some(idx) == version_index { Value::Integer(1) } else { value.clone() };
                (def.column.clone(), value)
            })
            .collect();

        let result = self
            .ctx
            .execute(&Statement::Insert {
                table: self.schema.table().to_string(),
                values,
            })
            .await?;
        let key = result
            .last_insert_id
            .ok_or_else(|| RecordError::StorageError(format!("no key generated for {}", self.schema.name())))?;

        let caller = self.ctx.caller();
        if self.schema.ownership() == Ownership::Owned && !caller.is_anonymous() && !caller.is_admin() {
            let username = caller.username().to_string();
            if let Err(err) = guard.record_owner(&username, &self.schema, key).await {
                self.discard_insert(key).await;
                return Err(err);
            }
        }

        self.values[key_index] = Value::Integer(key);
        if let Some(version) = version_index {
            self.values[version] = Value::Integer(1);
        }
        self.exists = true;
        self.dirty.clear();

        info!(entity = self.schema.name(), key, caller = %self.ctx.caller().username(), "record created");
        Ok(result.rows_affected)
    }

    /// Remove a row whose creation could not be completed.
    async fn discard_insert(&self, key: i64) {
        let statement = Statement::Delete {
            table: self.schema.table().to_string(),
            predicate: Predicate::eq(self.schema.key_column(), key),
        };
        if let Err(err) = self.ctx.execute(&statement).await {
            warn!(entity = self.schema.name(), key, error = %err, "could not discard unowned row");
        }
    }

    async fn update(&mut self) -> Result<u64> {
        let key = self.key().ok_or_else(|| {
            RecordError::StorageError(format!("stored {} record has no key", self.schema.name()))
        })?;
        self.ctx.guard().check_mutate(&self.schema, key, "update").await?;

        let version_index = self.schema.version_index();
        let mut assignments: Vec<(String, Value)> = self
            .dirty
            .iter()
            .filter(|idx| Some(**idx) != version_index)
            .map(|idx| (self.schema.fields()[*idx].column.clone(), self.values[*idx].clone()))
            .collect();

        let mut expect = None;
        let mut next_version = None;
        if let Some(idx) = version_index {
            let column = self.schema.fields()[idx].column.clone();
            let current = self.values[idx].as_i64().unwrap_or(0);
            let next = current.checked_add(1).ok_or_else(|| {
                RecordError::StorageError(format!("version of {} {} cannot advance", self.schema.name(), key))
            })?;
            expect = Some((column.clone(), Value::Integer(current)));
            next_version = Some(next);
            assignments.push((column, Value::Integer(next)));
        }

        let result = self
            .ctx
            .execute(&Statement::Update {
                table: self.schema.table().to_string(),
                key_column: self.schema.key_column().to_string(),
                key,
                assignments,
                expect,
            })
            .await?;

        if result.rows_affected == 0 {
            return Err(self.lost_update(key).await?);
        }

        if let (Some(idx), Some(version)) = (version_index, next_version) {
            self.values[idx] = Value::Integer(version);
        }
        debug!(entity = self.schema.name(), key, fields = self.dirty.len(), "record updated");
        self.dirty.clear();
        Ok(result.rows_affected)
    }

    /// Explain an UPDATE that matched nothing: the row is gone, or its
    /// version moved on.
    async fn lost_update(&mut self, key: i64) -> Result<RecordError> {
        let result = self
            .ctx
            .execute(&Statement::Count {
                table: self.schema.table().to_string(),
                predicate: Predicate::eq(self.schema.key_column(), key),
            })
            .await?;
        if result.scalar().and_then(Value::as_i64).unwrap_or(0) > 0 {
            Ok(RecordError::Conflict(self.schema.name().to_string(), key))
        } else {
            self.exists = false;
            Ok(RecordError::RecordDeleted(self.schema.name().to_string(), key))
        }
    }

    /// Whether the current caller owns this record. Provisional records
    /// are owned only by administrators.
    pub async fn is_owner(&self) -> Result<bool> {
        let caller = self.ctx.caller();
        match self.key() {
            Some(key) if self.exists => self.ctx.guard().is_owner(caller, self.schema.name(), key).await,
            _ => Ok(caller.is_admin()),
        }
    }

    /// Whether the current caller may update or delete this record.
    pub async fn may_mutate(&self) -> Result<bool> {
        match self.key() {
            Some(key) if self.exists => self.ctx.guard().may_mutate(&self.schema, key).await,
            _ => Ok(self.ctx.caller().has(Capability::Edit)),
        }
    }

    /// Grant `username` ownership of this stored record.
    pub async fn add_owner(&self, username: &str) -> Result<bool> {
        let key = match self.key() {
            Some(key) if self.exists => key,
            _ => {
                return Err(RecordError::StorageError(format!(
                    "cannot own an unsaved {} record",
                    self.schema.name()
                )));
            }
        };
        self.ctx.guard().grant(username, self.schema.name(), key).await
    }

    fn deleted_error(&self) -> RecordError {
        RecordError::RecordDeleted(self.schema.name().to_string(), self.key().unwrap_or(0))
    }
}

/// Reorder a storage row into schema field order.
pub(crate) fn align_row(schema: &EntitySchema, columns: &[String], row: Row) -> Result<Row> {
    let mut values = schema.default_row();
    for (column, value) in columns.iter().zip(row) {
        let idx = schema.field_index(column).map_err(|_| {
            RecordError::StorageError(format!("table {} returned undeclared column '{}'", schema.table(), column))
        })?;
        values[idx] = value;
    }
    Ok(values)
}

async fn fetch_first(ctx: &RequestContext, schema: &EntitySchema, predicate: Predicate) -> Result<Option<Row>> {
    let result = ctx
        .execute(&Statement::Select {
            table: schema.table().to_string(),
            predicate,
            order: vec![SortKey::asc(schema.key_column())],
            limit: Some(1),
            offset: 0,
        })
        .await?;
    let columns = result.columns.clone();
    match result.into_rows().into_iter().next() {
        Some(row) => Ok(Some(align_row(schema, &columns, row)?)),
        None => Ok(None),
    }
}

pub mod builtin;
pub mod registry;

pub use builtin::{genealogy_entities, owners_entity, OWNERS_ENTITY};
pub use registry::SchemaRegistry;

use crate::core::{FieldType, RecordError, Result, Value};
use std::collections::HashMap;

/// One declared field of an entity.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            field_type,
        }
    }

    pub fn default_value(&self) -> Value {
        self.field_type.default_value()
    }
}

/// Who may mutate rows of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Updates and deletes require an owners-table row for the caller.
    Owned,
    /// Any caller holding the edit capability may mutate.
    Shared,
}

/// A field of another entity that stores this entity's primary key.
///
/// Some fields hold keys of several entities, told apart by a type column
/// (`Events.idime` with `idtype`, `Citations.idime` with `type`). Such a
/// reference names the type values under which the field points here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub entity: String,
    pub field: String,
    pub discriminator: Option<(String, Vec<i64>)>,
}

impl Reference {
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            discriminator: None,
        }
    }

    /// Only rows whose `field` holds one of `values` refer to this entity.
    pub fn when(mut self, field: impl Into<String>, values: impl IntoIterator<Item = i64>) -> Self {
        self.discriminator = Some((field.into(), values.into_iter().collect()));
        self
    }
}

/// What `delete()` does about rows in other entities that refer to the
/// record being deleted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    #[default]
    Unrestricted,
    /// Refuse with `HasReferences` while any referencing row exists.
    RequireNoReferences(Vec<Reference>),
    /// Delete, reporting how many referencing rows were left behind.
    ReportDependents(Vec<Reference>),
}

impl DeletionPolicy {
    pub fn references(&self) -> &[Reference] {
        match self {
            Self::Unrestricted => &[],
            Self::RequireNoReferences(refs) | Self::ReportDependents(refs) => refs,
        }
    }
}

/// Static description of one entity: its table, primary key and fields.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
    key_index: Option<usize>,
    version_index: Option<usize>,
    /// lowercase logical name and lowercase column name → field index
    lookup: HashMap<String, usize>,
    ownership: Ownership,
    deletion: DeletionPolicy,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            key_index: None,
            version_index: None,
            lookup: HashMap::new(),
            ownership: Ownership::Shared,
            deletion: DeletionPolicy::Unrestricted,
        }
    }

    /// Declare the integer primary key. Always the first field.
    pub fn primary_key(mut self, name: &str, column: &str) -> Self {
        self.key_index = Some(self.push_field(FieldDef::new(name, column, FieldType::Integer)));
        self
    }

    pub fn field(mut self, name: &str, column: &str, field_type: FieldType) -> Self {
        self.push_field(FieldDef::new(name, column, field_type));
        self
    }

    /// Declare an integer version column used for compare-and-swap saves.
    pub fn versioned(mut self, name: &str, column: &str) -> Self {
        self.version_index = Some(self.push_field(FieldDef::new(name, column, FieldType::Integer)));
        self
    }

    pub fn owned(mut self) -> Self {
        self.ownership = Ownership::Owned;
        self
    }

    pub fn deletion(mut self, policy: DeletionPolicy) -> Self {
        self.deletion = policy;
        self
    }

    fn push_field(&mut self, def: FieldDef) -> usize {
        let idx = self.fields.len();
        self.lookup.entry(def.name.to_lowercase()).or_insert(idx);
        self.lookup.entry(def.column.to_lowercase()).or_insert(idx);
        self.fields.push(def);
        idx
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let key = self.key_index.ok_or_else(|| {
            RecordError::InvalidSchema(format!("entity '{}' has no primary key", self.name))
        })?;
        if key != 0 {
            return Err(RecordError::InvalidSchema(format!(
                "primary key of '{}' must be declared first",
                self.name
            )));
        }
        for (idx, def) in self.fields.iter().enumerate() {
            let by_name = self.lookup.get(&def.name.to_lowercase());
            if by_name != Some(&idx) {
                return Err(RecordError::InvalidSchema(format!(
                    "field '{}' declared twice in '{}'",
                    def.name, self.name
                )));
            }
        }
        let mut columns: Vec<String> = self.fields.iter().map(|f| f.column.to_lowercase()).collect();
        columns.sort();
        columns.dedup();
        if columns.len() != self.fields.len() {
            return Err(RecordError::InvalidSchema(format!(
                "duplicate column in '{}'",
                self.name
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn key_index(&self) -> usize {
        self.key_index.unwrap_or(0)
    }

    pub fn key_field(&self) -> &FieldDef {
        &self.fields[self.key_index()]
    }

    pub fn key_column(&self) -> &str {
        &self.key_field().column
    }

    pub fn version_index(&self) -> Option<usize> {
        self.version_index
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn deletion_policy(&self) -> &DeletionPolicy {
        &self.deletion
    }

    /// Case-insensitive resolution of a logical field name (or its column
    /// name) to the field's position.
    pub fn field_index(&self, field: &str) -> Result<usize> {
        self.lookup
            .get(&field.to_lowercase())
            .copied()
            .ok_or_else(|| RecordError::UnknownField(field.to_string(), self.name.clone()))
    }

    pub fn field_def(&self, field: &str) -> Result<&FieldDef> {
        self.field_index(field).map(|idx| &self.fields[idx])
    }

    pub fn column_for(&self, field: &str) -> Result<&str> {
        self.field_def(field).map(|def| def.column.as_str())
    }

    pub fn columns(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.column.clone()).collect()
    }

    pub fn default_row(&self) -> Vec<Value> {
        self.fields.iter().map(FieldDef::default_value).collect()
    }
}

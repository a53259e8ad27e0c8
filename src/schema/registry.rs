use super::{builtin, EntitySchema};
use crate::core::{RecordError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::Arc;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<SchemaRegistry> = Arc::new(
        SchemaRegistry::new(builtin::genealogy_entities())
            .expect("built-in genealogy entity table is valid")
    );
}

/// Immutable mapping from entity name to its schema.
///
/// Built once at startup; lookups never lock. Entities are reachable both by
/// logical name ("Locations") and by table name ("tblLR"), case-insensitively.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<Arc<EntitySchema>>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Registry of the built-in genealogy entities, shared process-wide.
    pub fn global() -> &'static Arc<SchemaRegistry> {
        &GLOBAL_REGISTRY
    }

    /// Build a registry from a fixed table of entity definitions.
    ///
    /// The owners relation is added when the table does not declare it.
    /// Every deletion-policy reference must name a registered entity field.
    pub fn new(definitions: Vec<EntitySchema>) -> Result<Self> {
        let mut registry = Self {
            entities: Vec::with_capacity(definitions.len() + 1),
            by_name: HashMap::new(),
        };

        for schema in definitions {
            registry.register(schema)?;
        }
        if registry.lookup(builtin::OWNERS_ENTITY).is_none() {
            registry.register(builtin::owners_entity())?;
        }

        for schema in &registry.entities {
            for reference in schema.deletion_policy().references() {
                let target = registry.resolve(&reference.entity).map_err(|_| {
                    RecordError::InvalidSchema(format!(
                        "'{}' deletion policy refers to unknown entity '{}'",
                        schema.name(),
                        reference.entity
                    ))
                })?;
                let discriminator = reference.discriminator.iter().map(|(field, _)| field);
                for field in std::iter::once(&reference.field).chain(discriminator) {
                    target.field_index(field).map_err(|_| {
                        RecordError::InvalidSchema(format!(
                            "'{}' deletion policy refers to unknown field '{}.{}'",
                            schema.name(),
                            reference.entity,
                            field
                        ))
                    })?;
                }
            }
        }

        Ok(registry)
    }

    fn register(&mut self, schema: EntitySchema) -> Result<()> {
        schema.validate()?;

        let idx = self.entities.len();
        for alias in [schema.name().to_lowercase(), schema.table().to_lowercase()] {
            if self.by_name.contains_key(&alias) {
                return Err(RecordError::InvalidSchema(format!(
                    "entity or table '{}' registered twice",
                    alias
                )));
            }
            self.by_name.insert(alias, idx);
        }
        self.entities.push(Arc::new(schema));
        Ok(())
    }

    fn lookup(&self, entity: &str) -> Option<&Arc<EntitySchema>> {
        self.by_name
            .get(&entity.to_lowercase())
            .map(|idx| &self.entities[*idx])
    }

    pub fn resolve(&self, entity: &str) -> Result<&Arc<EntitySchema>> {
        self.lookup(entity)
            .ok_or_else(|| RecordError::UnknownEntity(entity.to_string()))
    }

    pub fn column_for(&self, entity: &str, field: &str) -> Result<&str> {
        self.resolve(entity)?.column_for(field)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.entities.iter()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.lookup(entity).is_some()
    }
}

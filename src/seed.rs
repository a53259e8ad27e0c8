//! Loading fixture data into storage.
//!
//! A seed document maps entity (or table) names to lists of rows, each row
//! an object of field name to value:
//!
//! ```json
//! { "Locations": [ { "idlr": 7, "location": "Lot 5 Con 2, Caradoc" } ] }
//! ```
//!
//! Rows are written through `Record`, so field types are validated exactly
//! as for page input. Seeding runs with administrator rights.

use crate::connection::RequestContext;
use crate::connection::caller::Caller;
use crate::core::{RecordError, Result, Value};
use crate::record::Record;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

type SeedRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct SeedDocument(BTreeMap<String, Vec<SeedRow>>);

/// Rows written per entity.
pub type SeedSummary = BTreeMap<String, usize>;

pub async fn seed_from_json(ctx: &RequestContext, json: &str) -> Result<SeedSummary> {
    let document: SeedDocument =
        serde_json::from_str(json).map_err(|e| RecordError::InvalidConfig(format!("seed document: {}", e)))?;
    let admin = ctx.for_caller(Caller::admin("seed"));

    let mut summary = SeedSummary::new();
    for (entity, rows) in document.0 {
        let schema = admin.resolve(&entity)?;
        let written = rows.len();
        for row in rows {
            let mut record = Record::new(&admin, schema.name())?;
            for (field, json) in &row {
                record.set(field, Value::try_from(json)?)?;
            }
            record.save().await?;
        }
        info!(entity = schema.name(), rows = written, "seeded");
        *summary.entry(schema.name().to_string()).or_default() += written;
    }
    Ok(summary)
}

pub async fn load_seed_file(ctx: &RequestContext, path: impl AsRef<Path>) -> Result<SeedSummary> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RecordError::StorageError(format!("cannot read {}: {}", path.display(), e)))?;
    seed_from_json(ctx, &json).await
}

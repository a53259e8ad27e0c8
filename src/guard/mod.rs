use crate::connection::RequestContext;
use crate::connection::caller::{Capability, Caller};
use crate::core::{RecordError, Result, Value};
use crate::expression::Predicate;
use crate::schema::{EntitySchema, Ownership, OWNERS_ENTITY};
use crate::storage::Statement;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a caller may mutate a record, backed by the owners
/// relation.
///
/// An owners row is (username, table, key column, key value). Callers with
/// the admin capability are granted everything without consulting it.
pub struct OwnershipGuard<'a> {
    ctx: &'a RequestContext,
}

impl<'a> OwnershipGuard<'a> {
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self { ctx }
    }

    fn owners(&self) -> Result<Arc<EntitySchema>> {
        self.ctx.resolve(OWNERS_ENTITY)
    }

    fn ownership_predicate(owners: &EntitySchema, username: Option<&str>, target: &EntitySchema, key: i64) -> Result<Predicate> {
        let mut parts = vec![
            Predicate::eq(owners.column_for("ro_table")?, target.table()),
            Predicate::eq(owners.column_for("ro_keyvalue")?, key),
        ];
        if let Some(username) = username {
            parts.insert(0, Predicate::eq(owners.column_for("ro_username")?, username));
        }
        Ok(Predicate::all(parts))
    }

    /// True when `caller` is an administrator or holds an owners row for
    /// the record.
    pub async fn is_owner(&self, caller: &Caller, entity: &str, key: i64) -> Result<bool> {
        if caller.is_admin() {
            return Ok(true);
        }
        if caller.is_anonymous() {
            return Ok(false);
        }

        let target = self.ctx.resolve(entity)?;
        let owners = self.owners()?;
        let predicate = Self::ownership_predicate(&owners, Some(caller.username()), &target, key)?;
        let result = self
            .ctx
            .execute(&Statement::Count {
                table: owners.table().to_string(),
                predicate,
            })
            .await?;
        Ok(result.scalar().and_then(Value::as_i64).unwrap_or(0) > 0)
    }

    /// Usernames holding an owners row for the record, sorted.
    pub async fn owners_of(&self, entity: &str, key: i64) -> Result<Vec<String>> {
        let target = self.ctx.resolve(entity)?;
        let owners = self.owners()?;
        let predicate = Self::ownership_predicate(&owners, None, &target, key)?;
        let result = self
            .ctx
            .execute(&Statement::Distinct {
                table: owners.table().to_string(),
                column: owners.column_for("ro_username")?.to_string(),
                predicate,
            })
            .await?;
        Ok(result
            .into_rows()
            .into_iter()
            .filter_map(|mut row| match row.pop() {
                Some(Value::Text(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Give `username` ownership of the record. Only an existing owner or
    /// an administrator may do this. Returns false when it was already held.
    pub async fn grant(&self, username: &str, entity: &str, key: i64) -> Result<bool> {
        let target = self.ctx.resolve(entity)?;
        self.require_owner(&target, key, "grant ownership of").await?;
        self.record_owner(username, &target, key).await
    }

    /// Withdraw ownership; returns the number of owners rows removed.
    pub async fn revoke(&self, username: &str, entity: &str, key: i64) -> Result<u64> {
        let target = self.ctx.resolve(entity)?;
        self.require_owner(&target, key, "revoke ownership of").await?;

        let owners = self.owners()?;
        let predicate = Self::ownership_predicate(&owners, Some(username), &target, key)?;
        let result = self
            .ctx
            .execute(&Statement::Delete {
                table: owners.table().to_string(),
                predicate,
            })
            .await?;
        debug!(entity = target.name(), key, username, rows = result.rows_affected, "ownership revoked");
        Ok(result.rows_affected)
    }

    /// Insert an owners row without checking the current caller.
    pub(crate) async fn record_owner(&self, username: &str, target: &EntitySchema, key: i64) -> Result<bool> {
        let owners = self.owners()?;
        let predicate = Self::ownership_predicate(&owners, Some(username), target, key)?;
        let existing = self
            .ctx
            .execute(&Statement::Count {
                table: owners.table().to_string(),
                predicate,
            })
            .await?;
        if existing.scalar().and_then(Value::as_i64).unwrap_or(0) > 0 {
            return Ok(false);
        }

        self.ctx
            .execute(&Statement::Insert {
                table: owners.table().to_string(),
                values: vec![
                    (owners.column_for("ro_username")?.to_string(), username.into()),
                    (owners.column_for("ro_table")?.to_string(), target.table().into()),
                    (owners.column_for("ro_keyname")?.to_string(), target.key_column().into()),
                    (owners.column_for("ro_keyvalue")?.to_string(), key.into()),
                ],
            })
            .await?;
        debug!(entity = target.name(), key, username, "ownership granted");
        Ok(true)
    }

    /// Remove every owners row of a deleted record.
    pub(crate) async fn forget(&self, target: &EntitySchema, key: i64) -> Result<u64> {
        let owners = self.owners()?;
        let predicate = Self::ownership_predicate(&owners, None, target, key)?;
        let result = self
            .ctx
            .execute(&Statement::Delete {
                table: owners.table().to_string(),
                predicate,
            })
            .await?;
        Ok(result.rows_affected)
    }

    async fn require_owner(&self, target: &EntitySchema, key: i64, action: &str) -> Result<()> {
        let caller = self.ctx.caller();
        if self.is_owner(caller, target.name(), key).await? {
            return Ok(());
        }
        Err(self.deny(target, Some(key), action))
    }

    /// Whether the current caller may update or delete the record.
    pub async fn may_mutate(&self, target: &EntitySchema, key: i64) -> Result<bool> {
        let caller = self.ctx.caller();
        if caller.is_admin() {
            return Ok(true);
        }
        if !caller.has(Capability::Edit) {
            return Ok(false);
        }
        match target.ownership() {
            Ownership::Shared => Ok(true),
            Ownership::Owned => self.is_owner(caller, target.name(), key).await,
        }
    }

    pub(crate) async fn check_mutate(&self, target: &EntitySchema, key: i64, action: &str) -> Result<()> {
        if self.may_mutate(target, key).await? {
            Ok(())
        } else {
            Err(self.deny(target, Some(key), action))
        }
    }

    pub(crate) fn check_insert(&self, target: &EntitySchema) -> Result<()> {
        if self.ctx.caller().has(Capability::Edit) {
            Ok(())
        } else {
            Err(self.deny(target, None, "create"))
        }
    }

    fn deny(&self, target: &EntitySchema, key: Option<i64>, action: &str) -> RecordError {
        let caller = self.ctx.caller().username();
        warn!(entity = target.name(), key, caller, action, "permission denied");
        let who = if caller.is_empty() { "anonymous visitor" } else { caller };
        match key {
            Some(key) => RecordError::NotAuthorized(format!("{} may not {} {} {}", who, action, target.name(), key)),
            None => RecordError::NotAuthorized(format!("{} may not {} {}", who, action, target.name())),
        }
    }
}

//! In-process storage engine.
//!
//! Behaves like one database: a unique index on (owner, key, locale) per
//! table, all-or-nothing batch commits, and predicate evaluation with the
//! same semantics as the rendered SQL. It also keeps a registry of owners
//! standing in for the host's owner tables, so queries can select owners
//! that have no translations at all.

use super::{CommitReceipt, SaveBatch, TranslationStorage};
use crate::error::StorageError;
use crate::query::{order_nulls_last, JoinTarget, SortDirection, TranslationQuery};
use crate::record::{OwnerRef, TranslationRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

type Table = BTreeMap<i64, TranslationRecord>;

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Table>,
    owners: BTreeSet<OwnerRef>,
    next_id: i64,
    fail_next_commit: Option<String>,
    failing_deletes: u32,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    /// Record that an owner row exists (the host's owner table).
    pub fn register_owner(&self, owner: &OwnerRef) -> Result<(), StorageError> {
        self.lock()?.owners.insert(owner.clone());
        Ok(())
    }

    /// Forget an owner row. Its translation rows are left alone.
    pub fn remove_owner(&self, owner: &OwnerRef) -> Result<(), StorageError> {
        self.lock()?.owners.remove(owner);
        Ok(())
    }

    /// All rows of a table, by id.
    pub fn rows(&self, table: &str) -> Result<Vec<TranslationRecord>, StorageError> {
        Ok(self
            .lock()?
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Rows referencing `owner` across every table.
    pub fn count_for_owner(&self, owner: &OwnerRef) -> Result<usize, StorageError> {
        Ok(self
            .lock()?
            .tables
            .values()
            .flat_map(|t| t.values())
            .filter(|r| r.owner == *owner)
            .count())
    }

    /// Make the next commit fail without applying anything.
    pub fn fail_next_commit(&self, reason: impl Into<String>) -> Result<(), StorageError> {
        self.lock()?.fail_next_commit = Some(reason.into());
        Ok(())
    }

    /// Make the next `count` owner deletes fail.
    pub fn fail_next_deletes(&self, count: u32) -> Result<(), StorageError> {
        self.lock()?.failing_deletes = count;
        Ok(())
    }

    /// Insert a row directly, bypassing the backend (fixtures, legacy data).
    pub fn insert_raw(
        &self,
        table: &str,
        mut record: TranslationRecord,
    ) -> Result<i64, StorageError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        record.id = Some(id);
        record.created_at = Some(now);
        record.updated_at = Some(now);
        state.owners.insert(record.owner.clone());
        state.tables.entry(table.to_string()).or_default().insert(id, record);
        Ok(id)
    }
}

fn check_unique(name: &str, table: &Table) -> Result<(), StorageError> {
    let mut seen = HashSet::new();
    for record in table.values() {
        if !seen.insert((&record.owner, record.key.as_str(), record.locale.as_str())) {
            return Err(StorageError::UniqueViolation {
                table: name.to_string(),
                owner_type: record.owner.owner_type.clone(),
                owner_id: record.owner.owner_id,
                key: record.key.clone(),
                locale: record.locale.to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl TranslationStorage for MemoryStorage {
    async fn load(
        &self,
        table: &str,
        owner: &OwnerRef,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TranslationRecord>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| r.owner == *owner && keys.contains(&r.key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, batch: &SaveBatch) -> Result<CommitReceipt, StorageError> {
        let mut state = self.lock()?;
        if let Some(reason) = state.fail_next_commit.take() {
            return Err(StorageError::Backend(reason));
        }

        // Work on copies; nothing is visible until every check passes
        let mut tables = state.tables.clone();
        let mut next_id = state.next_id;
        let now = Utc::now();
        let mut inserted_ids = Vec::with_capacity(batch.tables.len());
        let mut touched = BTreeSet::new();
        let mut owners = Vec::new();

        for changes in &batch.tables {
            let table = tables.entry(changes.table.clone()).or_default();
            touched.insert(changes.table.clone());

            for id in &changes.deletes {
                table.remove(id);
            }
            for record in &changes.updates {
                let Some(id) = record.id else { continue };
                if let Some(stored) = table.get_mut(&id) {
                    stored.value = record.value.clone();
                    stored.updated_at = Some(now);
                }
            }
            let mut ids = Vec::with_capacity(changes.inserts.len());
            for record in &changes.inserts {
                next_id += 1;
                let mut stored = record.clone();
                stored.id = Some(next_id);
                stored.created_at = Some(now);
                stored.updated_at = Some(now);
                owners.push(stored.owner.clone());
                table.insert(next_id, stored);
                ids.push(next_id);
            }
            inserted_ids.push(ids);
        }

        for name in &touched {
            if let Some(table) = tables.get(name) {
                check_unique(name, table)?;
            }
        }

        state.tables = tables;
        state.next_id = next_id;
        state.owners.extend(owners);
        debug!("Committed batch touching {} table(s)", touched.len());

        Ok(CommitReceipt {
            inserted_ids,
            committed_at: now,
        })
    }

    async fn delete_owner(&self, table: &str, owner: &OwnerRef) -> Result<u64, StorageError> {
        let mut state = self.lock()?;
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(StorageError::Backend(format!(
                "simulated failure deleting {} rows for {}",
                table, owner
            )));
        }
        let Some(rows) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|_, r| r.owner != *owner);
        Ok((before - rows.len()) as u64)
    }

    async fn matching_owners(&self, query: &TranslationQuery) -> Result<Vec<i64>, StorageError> {
        let state = self.lock()?;

        // (table, owner id, key, locale) -> value, for this owner type only
        let mut index: HashMap<(&str, i64, &str, &str), &str> = HashMap::new();
        for (name, table) in &state.tables {
            for record in table.values() {
                if record.owner.owner_type != query.owner_type() {
                    continue;
                }
                if let Some(value) = record.value.as_deref() {
                    index.insert(
                        (
                            name.as_str(),
                            record.owner.owner_id,
                            record.key.as_str(),
                            record.locale.as_str(),
                        ),
                        value,
                    );
                }
            }
        }

        let lookup_for = |owner_id: i64| {
            let index = &index;
            move |target: &JoinTarget| {
                index
                    .get(&(
                        target.table.as_str(),
                        owner_id,
                        target.attribute.as_str(),
                        target.locale.as_str(),
                    ))
                    .map(|v| v.to_string())
            }
        };

        let mut selected: Vec<i64> = state
            .owners
            .iter()
            .filter(|o| o.owner_type == query.owner_type())
            .map(|o| o.owner_id)
            .filter(|id| query.predicate().matches(&lookup_for(*id)))
            .collect();

        if !query.ordering().is_empty() {
            // Stable sort keeps id order as the final tiebreak
            selected.sort_by(|a, b| {
                let (la, lb) = (lookup_for(*a), lookup_for(*b));
                for order in query.ordering() {
                    let va = order.column.resolve(&la);
                    let vb = order.column.resolve(&lb);
                    let ord = order_nulls_last(va.as_deref(), vb.as_deref());
                    let ord = match order.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord.is_ne() {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        if let Some(limit) = query.limit_value() {
            selected.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(selected)
    }
}

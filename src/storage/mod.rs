//! Storage engines for translation rows.
//!
//! The backend never writes rows one at a time: a save hands the engine a
//! `SaveBatch` that must apply completely or not at all.

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

use crate::error::StorageError;
use crate::query::TranslationQuery;
use crate::record::{OwnerRef, TranslationRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Pending changes for one association, written to its table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableChanges {
    pub association: String,
    pub table: String,
    /// Unsaved records, in association order
    pub inserts: Vec<TranslationRecord>,
    /// Persisted records whose values are written back
    pub updates: Vec<TranslationRecord>,
    /// Ids of persisted records to delete
    pub deletes: Vec<i64>,
}

impl TableChanges {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Everything one owner save writes, across all of its associations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveBatch {
    pub tables: Vec<TableChanges>,
}

impl SaveBatch {
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(TableChanges::is_empty)
    }

    pub fn write_count(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.inserts.len() + t.updates.len())
            .sum()
    }
}

/// Result of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// New ids per `SaveBatch::tables` entry, in insert order
    pub inserted_ids: Vec<Vec<i64>>,
    pub committed_at: DateTime<Utc>,
}

#[async_trait]
pub trait TranslationStorage: Send + Sync {
    /// Rows of `table` owned by `owner` whose key is in `keys`, by id.
    async fn load(
        &self,
        table: &str,
        owner: &OwnerRef,
        keys: &BTreeSet<String>,
    ) -> Result<Vec<TranslationRecord>, StorageError>;

    /// Apply a batch atomically.
    async fn commit(&self, batch: &SaveBatch) -> Result<CommitReceipt, StorageError>;

    /// Delete every row of `table` owned by `owner`. Returns rows removed.
    async fn delete_owner(&self, table: &str, owner: &OwnerRef) -> Result<u64, StorageError>;

    /// Owner ids selected by `query`, in the query's order.
    async fn matching_owners(&self, query: &TranslationQuery) -> Result<Vec<i64>, StorageError>;
}

impl StorageError {
    /// Whether retrying the same operation could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::UniqueViolation { .. } => false,
            StorageError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StorageError::Backend(_) => true,
        }
    }
}

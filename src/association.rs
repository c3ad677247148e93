//! Owner-side translation collections.
//!
//! An owner keeps one `Association` per declared association name. Records
//! built by lookups live here until the owner is saved; persisted records
//! removed from the collection wait in `pending_deletes` until the next
//! successful commit.

use crate::record::{OwnerRef, TranslationRecord};
use std::collections::BTreeMap;

/// Capability implemented by records that own translations.
pub trait Translatable {
    /// Polymorphic reference used as the translation rows' owner key.
    fn owner_ref(&self) -> OwnerRef;

    fn translations(&self) -> &TranslationSet;

    fn translations_mut(&mut self) -> &mut TranslationSet;
}

/// In-memory translation records of one association for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    records: Vec<TranslationRecord>,
    pending_deletes: Vec<TranslationRecord>,
}

impl Association {
    pub fn records(&self) -> &[TranslationRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<TranslationRecord> {
        &mut self.records
    }

    /// Persisted records removed from the collection, deleted on next save.
    pub fn pending_deletes(&self) -> &[TranslationRecord] {
        &self.pending_deletes
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record and return its position.
    pub(crate) fn push(&mut self, record: TranslationRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    /// Remove every record matching `pred`; persisted ones are queued for
    /// deletion. Returns how many were removed.
    pub(crate) fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&TranslationRecord) -> bool,
    {
        let before = self.records.len();
        let mut kept = Vec::with_capacity(before);
        for record in self.records.drain(..) {
            if pred(&record) {
                if record.is_persisted() {
                    self.pending_deletes.push(record);
                }
            } else {
                kept.push(record);
            }
        }
        self.records = kept;
        before - self.records.len()
    }

    pub(crate) fn clear_pending_deletes(&mut self) {
        self.pending_deletes.clear();
    }

    /// Replace the contents with freshly loaded rows.
    pub(crate) fn replace(&mut self, records: Vec<TranslationRecord>) {
        self.records = records;
        self.pending_deletes.clear();
    }
}

/// All translation associations of one owner, keyed by association name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationSet {
    associations: BTreeMap<String, Association>,
}

impl TranslationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, association: &str) -> Option<&Association> {
        self.associations.get(association)
    }

    pub fn get_mut(&mut self, association: &str) -> Option<&mut Association> {
        self.associations.get_mut(association)
    }

    /// Association by name, created empty on first use.
    pub fn association_mut(&mut self, association: &str) -> &mut Association {
        self.associations.entry(association.to_string()).or_default()
    }

    /// Records of `association` (empty slice if it was never touched).
    pub fn records(&self, association: &str) -> &[TranslationRecord] {
        self.associations
            .get(association)
            .map(Association::records)
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Association)> {
        self.associations.iter().map(|(name, a)| (name.as_str(), a))
    }

    /// Drop every in-memory record, saved or not.
    pub fn clear(&mut self) {
        self.associations.clear();
    }
}

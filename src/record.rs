use crate::locale::Locale;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Polymorphic reference to the record that owns a translation.
///
/// One translation table serves many owner types, so the reference carries
/// the owner's type tag next to its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: i64,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: i64) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.owner_id)
    }
}

/// A value is blank when it is missing, empty, or whitespace only.
pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// One (attribute, locale) value for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    /// Storage identity; `None` until the owner's save commits this record.
    pub id: Option<i64>,
    pub owner: OwnerRef,
    pub key: String,
    pub locale: Locale,
    pub value: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TranslationRecord {
    /// Build an unsaved record with no value.
    pub fn build(owner: OwnerRef, key: impl Into<String>, locale: Locale) -> Self {
        Self {
            id: None,
            owner,
            key: key.into(),
            locale,
            value: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_blank(&self) -> bool {
        is_blank(self.value.as_deref())
    }

    /// Whether this record holds `key` in `locale`.
    pub fn matches(&self, key: &str, locale: &Locale) -> bool {
        self.key == key && self.locale == *locale
    }

    /// Copy this record for another owner: same content, no storage identity.
    pub fn duplicate_for(&self, owner: OwnerRef) -> Self {
        Self {
            id: None,
            owner,
            key: self.key.clone(),
            locale: self.locale.clone(),
            value: self.value.clone(),
            created_at: None,
            updated_at: None,
        }
    }
}

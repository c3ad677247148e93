//! The key-value translation backend.
//!
//! One `KeyValueBackend` serves one owner type. Each declared attribute
//! group maps a set of attribute keys to an association name and a record
//! shape; an owner's values for those attributes live as one
//! `TranslationRecord` per (attribute, locale) in the shape's table.
//!
//! Lifecycle hooks the host calls:
//! - `prune_blank` before the owner persists (`save` runs it)
//! - `cascade_delete` after the owner is destroyed
//! - `duplicate_translations` when the owner is copied

use crate::association::Translatable;
use crate::config::{BackendOptions, DefaultOptions};
use crate::error::{ConfigError, Result, StorageError, TranslationError};
use crate::locale::{Locale, LocaleSelection};
use crate::metrics::BackendMetrics;
use crate::query::{
    CompareOp, Predicate, QueryValue, TranslatedColumn, TranslatedCompare, TranslationQuery,
};
use crate::record::{is_blank, TranslationRecord};
use crate::retry::{with_retry_if, RetryConfig};
use crate::scope::AttributeScopes;
use crate::shape::{RecordShape, ShapeRegistry};
use crate::storage::{SaveBatch, TableChanges, TranslationStorage};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// A declared association and the shape of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeGroup {
    pub association: String,
    pub shape: RecordShape,
    pub presence: bool,
}

/// Outcome of a post-destroy cascade. Failures are reported, not raised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub deleted: u64,
    /// Tables whose rows for the owner may be orphaned
    pub failed_tables: Vec<String>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failed_tables.is_empty()
    }
}

#[derive(Debug)]
pub struct KeyValueBackend {
    owner_type: String,
    owner_table: String,
    shapes: ShapeRegistry,
    defaults: DefaultOptions,
    scopes: AttributeScopes,
    groups: BTreeMap<String, AttributeGroup>,
    cascade_retry: RetryConfig,
    metrics: BackendMetrics,
}

impl KeyValueBackend {
    /// Backend for owners of `owner_type` stored in `owner_table`, with the
    /// default `string`/`text` shapes and default options.
    pub fn new(owner_type: impl Into<String>, owner_table: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_table: owner_table.into(),
            shapes: ShapeRegistry::default(),
            defaults: DefaultOptions::default(),
            scopes: AttributeScopes::new(),
            groups: BTreeMap::new(),
            cascade_retry: RetryConfig::cascade_delete(),
            metrics: BackendMetrics::new(),
        }
    }

    pub fn with_shapes(mut self, shapes: ShapeRegistry) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_default_options(mut self, defaults: DefaultOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_cascade_retry(mut self, retry: RetryConfig) -> Self {
        self.cascade_retry = retry;
        self
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    pub fn scopes(&self) -> &AttributeScopes {
        &self.scopes
    }

    pub fn metrics(&self) -> &BackendMetrics {
        &self.metrics
    }

    pub fn groups(&self) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.values()
    }

    /// Declare `attributes` as translated.
    ///
    /// Declarations under an existing association union into its scope.
    /// Every option problem, including an unresolvable shape, fails here.
    pub fn declare_translated<I, S>(
        &mut self,
        attributes: I,
        options: &BackendOptions,
    ) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let resolved = options.resolve(&self.defaults)?;
        let shape = self.shapes.resolve(&resolved.shape_tag)?.clone();
        let attributes: Vec<String> = attributes
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();

        if let Some(existing) = self.groups.get(&resolved.association_name) {
            if existing.shape != shape {
                return Err(ConfigError::InvalidOption {
                    key: "association_name".to_string(),
                    reason: format!(
                        "'{}' already stores {} records",
                        resolved.association_name, existing.shape.name
                    ),
                });
            }
            if existing.presence != resolved.presence {
                return Err(ConfigError::InvalidOption {
                    key: "presence".to_string(),
                    reason: format!(
                        "'{}' was declared with presence {}",
                        resolved.association_name, existing.presence
                    ),
                });
            }
        }
        for attribute in &attributes {
            if let Some(other) = self.scopes.association_for(attribute) {
                if other != resolved.association_name {
                    return Err(ConfigError::InvalidOption {
                        key: "association_name".to_string(),
                        reason: format!(
                            "'{}' is already translated through '{}'",
                            attribute, other
                        ),
                    });
                }
            }
        }

        self.scopes.register(&resolved.association_name, &attributes);
        self.groups
            .entry(resolved.association_name.clone())
            .or_insert_with(|| AttributeGroup {
                association: resolved.association_name.clone(),
                shape,
                presence: resolved.presence,
            });

        info!(
            "{}: translating {:?} through {}",
            self.owner_type, attributes, resolved.association_name
        );
        Ok(())
    }

    /// Group holding `attribute`.
    pub fn group_for(&self, attribute: &str) -> Result<&AttributeGroup> {
        self.scopes
            .association_for(attribute)
            .and_then(|association| self.groups.get(association))
            .ok_or_else(|| TranslationError::UndeclaredAttribute {
                attribute: attribute.to_string(),
            })
    }

    /// The owner's record for `attribute` in `locale`, built and attached
    /// to the owner if it has none yet.
    ///
    /// Repeated calls before a save return the same record, so a write is
    /// visible to the next read. More than one live match is an integrity
    /// violation and is returned as `DuplicateTranslation`.
    pub fn translation_for<'o, O>(
        &self,
        owner: &'o mut O,
        attribute: &str,
        locale: impl Into<Locale>,
    ) -> Result<&'o mut TranslationRecord>
    where
        O: Translatable + ?Sized,
    {
        let group = self.group_for(attribute)?;
        let locale = locale.into();
        let owner_ref = owner.owner_ref();
        let association = owner.translations_mut().association_mut(&group.association);

        let found: Vec<usize> = association
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.matches(attribute, &locale))
            .map(|(i, _)| i)
            .collect();

        let index = match found.as_slice() {
            [index] => {
                self.metrics.record_lookup_hit();
                *index
            }
            [] => {
                self.metrics.record_lookup_miss();
                debug!("Building {} {} record for {}", attribute, locale, owner_ref);
                association.push(TranslationRecord::build(owner_ref, attribute, locale))
            }
            many => {
                error!(
                    "{} live {} records for {} in {}",
                    many.len(),
                    attribute,
                    owner_ref,
                    locale
                );
                return Err(TranslationError::DuplicateTranslation {
                    owner: owner_ref.to_string(),
                    key: attribute.to_string(),
                    locale: locale.to_string(),
                    count: many.len(),
                });
            }
        };

        Ok(&mut association.records_mut()[index])
    }

    /// Current value; blank reads as `None` when presence is on.
    pub fn read<O>(
        &self,
        owner: &mut O,
        attribute: &str,
        locale: impl Into<Locale>,
    ) -> Result<Option<String>>
    where
        O: Translatable + ?Sized,
    {
        let presence = self.group_for(attribute)?.presence;
        let record = self.translation_for(owner, attribute, locale)?;
        if presence && record.is_blank() {
            return Ok(None);
        }
        Ok(record.value.clone())
    }

    /// First non-blank value over `locales`, in order.
    pub fn read_with_fallbacks<O>(
        &self,
        owner: &mut O,
        attribute: &str,
        locales: &[Locale],
    ) -> Result<Option<String>>
    where
        O: Translatable + ?Sized,
    {
        for locale in locales {
            let record = self.translation_for(owner, attribute, locale)?;
            if !record.is_blank() {
                return Ok(record.value.clone());
            }
        }
        Ok(None)
    }

    /// Set the value; blank becomes `None` when presence is on.
    pub fn write<O>(
        &self,
        owner: &mut O,
        attribute: &str,
        locale: impl Into<Locale>,
        value: Option<&str>,
    ) -> Result<()>
    where
        O: Translatable + ?Sized,
    {
        let presence = self.group_for(attribute)?.presence;
        let record = self.translation_for(owner, attribute, locale)?;
        record.value = if presence && is_blank(value) {
            None
        } else {
            value.map(str::to_string)
        };
        Ok(())
    }

    /// Locales holding a non-blank in-memory value for `attribute`.
    pub fn locales_for<O>(&self, owner: &O, attribute: &str) -> Result<Vec<Locale>>
    where
        O: Translatable + ?Sized,
    {
        let group = self.group_for(attribute)?;
        Ok(owner
            .translations()
            .records(&group.association)
            .iter()
            .filter(|r| r.key == attribute && !r.is_blank())
            .map(|r| r.locale.clone())
            .collect())
    }

    /// Pre-save hook: drop blank records from every declared association.
    ///
    /// Persisted blanks are queued for deletion in the same save.
    pub fn prune_blank<O>(&self, owner: &mut O) -> usize
    where
        O: Translatable + ?Sized,
    {
        let mut pruned = 0;
        for group in self.groups.values() {
            if let Some(association) = owner.translations_mut().get_mut(&group.association) {
                pruned += association.remove_where(TranslationRecord::is_blank);
            }
        }
        if pruned > 0 {
            debug!("Pruned {} blank translation(s)", pruned);
            self.metrics.record_pruned(pruned);
        }
        pruned
    }

    /// Persist the owner's translations as one atomic batch.
    ///
    /// Runs `prune_blank` first. If the commit fails, storage is unchanged
    /// and queued deletions stay queued for the next attempt.
    pub async fn save<O, S>(&self, owner: &mut O, storage: &S) -> Result<usize>
    where
        O: Translatable + ?Sized,
        S: TranslationStorage + ?Sized,
    {
        self.prune_blank(owner);
        let owner_ref = owner.owner_ref();

        let mut batch = SaveBatch::default();
        for group in self.groups.values() {
            let Some(association) = owner.translations_mut().get_mut(&group.association) else {
                continue;
            };
            let mut changes = TableChanges {
                association: group.association.clone(),
                table: group.shape.table.clone(),
                ..Default::default()
            };
            for record in association.records_mut().iter_mut() {
                record.owner = owner_ref.clone();
                if record.is_persisted() {
                    changes.updates.push(record.clone());
                } else {
                    changes.inserts.push(record.clone());
                }
            }
            changes.deletes = association
                .pending_deletes()
                .iter()
                .filter_map(|r| r.id)
                .collect();
            batch.tables.push(changes);
        }

        if batch.is_empty() {
            return Ok(0);
        }

        let receipt = storage.commit(&batch).await?;

        for (changes, ids) in batch.tables.iter().zip(&receipt.inserted_ids) {
            let Some(association) = owner.translations_mut().get_mut(&changes.association) else {
                continue;
            };
            let mut ids = ids.iter();
            for record in association.records_mut().iter_mut() {
                if record.is_persisted() {
                    record.updated_at = Some(receipt.committed_at);
                } else if let Some(id) = ids.next() {
                    record.id = Some(*id);
                    record.created_at = Some(receipt.committed_at);
                    record.updated_at = Some(receipt.committed_at);
                }
            }
            association.clear_pending_deletes();
        }

        let written = batch.write_count();
        self.metrics.record_committed(written);
        info!("Saved {} translation(s) for {}", written, owner_ref);
        Ok(written)
    }

    /// Replace the owner's associations with their persisted rows, each
    /// restricted to its declared attribute keys.
    pub async fn load<O, S>(&self, owner: &mut O, storage: &S) -> Result<()>
    where
        O: Translatable + ?Sized,
        S: TranslationStorage + ?Sized,
    {
        let owner_ref = owner.owner_ref();
        for group in self.groups.values() {
            let keys = self.scopes.scope_filter(&group.association);
            let rows = storage
                .load(&group.shape.table, &owner_ref, &keys)
                .await?;
            owner
                .translations_mut()
                .association_mut(&group.association)
                .replace(rows);
        }
        Ok(())
    }

    /// Post-destroy hook: remove every translation of the owner, in memory
    /// and in every registered shape table.
    ///
    /// Each table gets its own retried delete. A table that still fails is
    /// logged and listed in the report; the owner's destruction stands.
    pub async fn cascade_delete<O, S>(&self, owner: &mut O, storage: &S) -> CascadeReport
    where
        O: Translatable + ?Sized,
        S: TranslationStorage + ?Sized,
    {
        owner.translations_mut().clear();
        let owner_ref = owner.owner_ref();
        let owner_ref = &owner_ref;
        let mut report = CascadeReport::default();

        for shape in self.shapes.all() {
            let table = shape.table.as_str();
            let result = with_retry_if(
                &self.cascade_retry,
                &format!("Cascade delete {} for {}", table, owner_ref),
                || storage.delete_owner(table, owner_ref),
                StorageError::is_transient,
            )
            .await;

            match result {
                Ok(deleted) => report.deleted += deleted,
                Err(e) => {
                    error!(
                        "Cascade delete failed for {} in {} (rows may be orphaned): {}",
                        owner_ref, table, e
                    );
                    self.metrics.record_cascade_failure();
                    report.failed_tables.push(table.to_string());
                }
            }
        }

        if report.deleted > 0 {
            self.metrics.record_cascade_deleted(report.deleted as usize);
        }
        if report.is_complete() {
            debug!("Removed {} translation(s) for {}", report.deleted, owner_ref);
        } else {
            warn!(
                "Cascade for {} incomplete: {:?}",
                owner_ref, report.failed_tables
            );
        }
        report
    }

    /// Duplication hook: give `target` independent copies of `source`'s
    /// records (saved or not), repointed at `target`.
    pub fn duplicate_translations<S, T>(&self, source: &S, target: &mut T) -> usize
    where
        S: Translatable + ?Sized,
        T: Translatable + ?Sized,
    {
        let target_ref = target.owner_ref();
        let mut copied = 0;
        for group in self.groups.values() {
            let copies: Vec<TranslationRecord> = source
                .translations()
                .records(&group.association)
                .iter()
                .map(|r| r.duplicate_for(target_ref.clone()))
                .collect();
            copied += copies.len();
            target
                .translations_mut()
                .association_mut(&group.association)
                .replace(copies);
        }
        copied
    }

    /// A translated attribute read through `locales`, for filters and
    /// ordering.
    pub fn column(
        &self,
        association: &str,
        attribute: &str,
        locales: impl Into<LocaleSelection>,
    ) -> Result<TranslatedColumn> {
        let group = self
            .groups
            .get(association)
            .filter(|_| self.scopes.contains(association, attribute))
            .ok_or_else(|| TranslationError::UndeclaredAttribute {
                attribute: format!("{}.{}", association, attribute),
            })?;

        Ok(TranslatedColumn {
            table: group.shape.table.clone(),
            association: group.association.clone(),
            attribute: attribute.to_string(),
            locales: locales.into().candidates()?,
        })
    }

    /// Filter owners by `attribute` read through `locales` (first non-null
    /// in a fallback sequence wins) compared with `value`.
    pub fn build_locale_predicate(
        &self,
        association: &str,
        attribute: &str,
        locales: impl Into<LocaleSelection>,
        op: CompareOp,
        value: impl Into<QueryValue>,
    ) -> Result<Predicate> {
        let column = self.column(association, attribute, locales)?;
        Ok(Predicate::Compare(TranslatedCompare::new(
            column,
            op,
            value.into(),
        )?))
    }

    /// Empty query over this backend's owners.
    pub fn query(&self) -> TranslationQuery {
        TranslationQuery::new(&self.owner_table, &self.owner_type)
    }

    /// Owner ids selected by `query`.
    pub async fn find_owners<S>(&self, query: &TranslationQuery, storage: &S) -> Result<Vec<i64>>
    where
        S: TranslationStorage + ?Sized,
    {
        Ok(storage.matching_owners(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::TranslationSet;
    use crate::record::OwnerRef;
    use crate::storage::MemoryStorage;

    #[derive(Debug, Default)]
    struct Post {
        id: i64,
        translations: TranslationSet,
    }

    impl Post {
        fn new(id: i64) -> Self {
            Self {
                id,
                translations: TranslationSet::new(),
            }
        }
    }

    impl Translatable for Post {
        fn owner_ref(&self) -> OwnerRef {
            OwnerRef::new("Post", self.id)
        }

        fn translations(&self) -> &TranslationSet {
            &self.translations
        }

        fn translations_mut(&mut self) -> &mut TranslationSet {
            &mut self.translations
        }
    }

    fn backend() -> KeyValueBackend {
        let mut backend = KeyValueBackend::new("Post", "posts");
        backend
            .declare_translated(["title"], &BackendOptions::new().with_type("string"))
            .unwrap();
        backend
            .declare_translated(["content"], &BackendOptions::new().with_type("text"))
            .unwrap();
        backend
    }

    #[test]
    fn test_declare_requires_type() {
        let mut backend = KeyValueBackend::new("Post", "posts");
        let err = backend
            .declare_translated(["title"], &BackendOptions::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingType);
        assert!(backend.groups().next().is_none());
    }

    #[test]
    fn test_declare_unknown_type_fails_at_setup() {
        let mut backend = KeyValueBackend::new("Post", "posts");
        let err = backend
            .declare_translated(["title"], &BackendOptions::new().with_type("rich_text"))
            .unwrap_err();
        assert!(err.to_string().contains("RichTextTranslation"));
    }

    #[test]
    fn test_declare_uses_default_type() {
        let mut defaults = DefaultOptions::default();
        defaults.set("type", "text".into()).unwrap();
        let mut backend = KeyValueBackend::new("Post", "posts").with_default_options(defaults);

        backend
            .declare_translated(["title"], &BackendOptions::new())
            .unwrap();

        let group = backend.group_for("title").unwrap();
        assert_eq!(group.association, "text_translations");
        assert_eq!(group.shape.tag, "text");
    }

    #[test]
    fn test_declarations_accumulate_scope() {
        let mut backend = backend();
        backend
            .declare_translated(["subtitle"], &BackendOptions::new().with_type("string"))
            .unwrap();

        let scope = backend.scopes().scope_filter("string_translations");
        assert!(scope.contains("title"));
        assert!(scope.contains("subtitle"));
        assert_eq!(backend.groups().count(), 2);
    }

    #[test]
    fn test_attribute_cannot_move_association() {
        let mut backend = backend();
        let err = backend
            .declare_translated(["title"], &BackendOptions::new().with_type("text"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn test_association_cannot_change_presence() {
        let mut backend = backend();
        let err = backend
            .declare_translated(
                ["subtitle"],
                &BackendOptions::new()
                    .with_type("string")
                    .with_presence(false),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "presence"));

        // Rejected declarations leave the existing group alone
        assert!(backend.group_for("subtitle").is_err());
        assert!(backend.group_for("title").unwrap().presence);
    }

    #[test]
    fn test_presence_off_needs_its_own_association() {
        let mut backend = backend();
        backend
            .declare_translated(
                ["subtitle"],
                &BackendOptions::new()
                    .with_type("string")
                    .with_presence(false)
                    .with_association_name("raw_string_translations"),
            )
            .unwrap();

        assert!(!backend.group_for("subtitle").unwrap().presence);
        assert!(backend.group_for("title").unwrap().presence);
    }

    #[test]
    fn test_association_cannot_change_shape() {
        let mut backend = backend();
        let err = backend
            .declare_translated(
                ["summary"],
                &BackendOptions::new()
                    .with_type("text")
                    .with_association_name("string_translations"),
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn test_translation_for_returns_same_instance() {
        let backend = backend();
        let mut post = Post::new(1);

        let first: *const TranslationRecord =
            backend.translation_for(&mut post, "title", "en").unwrap();
        let second: *const TranslationRecord =
            backend.translation_for(&mut post, "title", "en").unwrap();

        assert!(std::ptr::eq(first, second));
        assert_eq!(post.translations().records("string_translations").len(), 1);
        let report = backend.metrics().report();
        assert_eq!(report.lookup_misses, 1);
        assert_eq!(report.lookup_hits, 1);
    }

    #[test]
    fn test_translation_for_undeclared_attribute() {
        let backend = backend();
        let mut post = Post::new(1);
        let err = backend.translation_for(&mut post, "slug", "en").unwrap_err();
        assert!(matches!(err, TranslationError::UndeclaredAttribute { .. }));
    }

    #[test]
    fn test_translation_for_rejects_duplicates() {
        let backend = backend();
        let mut post = Post::new(1);
        let association = post.translations_mut().association_mut("string_translations");
        for _ in 0..2 {
            association.push(TranslationRecord::build(
                OwnerRef::new("Post", 1),
                "title",
                Locale::from("en"),
            ));
        }

        let err = backend.translation_for(&mut post, "title", "en").unwrap_err();
        assert!(matches!(
            err,
            TranslationError::DuplicateTranslation { count: 2, .. }
        ));
    }

    #[test]
    fn test_write_then_read() {
        let backend = backend();
        let mut post = Post::new(1);

        backend.write(&mut post, "title", "en", Some("Hello")).unwrap();
        backend.write(&mut post, "title", "fr", Some("   ")).unwrap();

        assert_eq!(backend.read(&mut post, "title", "en").unwrap().as_deref(), Some("Hello"));
        assert_eq!(backend.read(&mut post, "title", "fr").unwrap(), None);
        assert_eq!(backend.locales_for(&post, "title").unwrap(), vec![Locale::from("en")]);
    }

    #[test]
    fn test_write_without_presence_keeps_blank() {
        let mut backend = KeyValueBackend::new("Post", "posts");
        backend
            .declare_translated(
                ["title"],
                &BackendOptions::new().with_type("string").with_presence(false),
            )
            .unwrap();
        let mut post = Post::new(1);

        backend.write(&mut post, "title", "en", Some("")).unwrap();
        assert_eq!(backend.read(&mut post, "title", "en").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_read_with_fallbacks_skips_blank() {
        let backend = backend();
        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();

        let locales = [Locale::from("fr"), Locale::from("en")];
        assert_eq!(
            backend.read_with_fallbacks(&mut post, "title", &locales).unwrap().as_deref(),
            Some("Hi")
        );
        assert_eq!(
            backend.read_with_fallbacks(&mut post, "title", &locales[..1]).unwrap(),
            None
        );
    }

    #[test]
    fn test_prune_blank_across_associations() {
        let backend = backend();
        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.translation_for(&mut post, "title", "fr").unwrap();
        backend.translation_for(&mut post, "content", "en").unwrap();

        assert_eq!(backend.prune_blank(&mut post), 2);
        assert_eq!(post.translations().records("string_translations").len(), 1);
        assert!(post.translations().records("text_translations").is_empty());
        // Unsaved blanks are dropped, not queued
        assert!(post
            .translations()
            .get("text_translations")
            .is_some_and(|a| a.pending_deletes().is_empty()));
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_timestamps() {
        let backend = backend();
        let storage = MemoryStorage::new();
        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.write(&mut post, "content", "en", Some("Body")).unwrap();

        assert_eq!(backend.save(&mut post, &storage).await.unwrap(), 2);

        let record = backend.translation_for(&mut post, "title", "en").unwrap();
        assert!(record.is_persisted());
        assert!(record.created_at.is_some());
        assert_eq!(storage.rows("string_translations").unwrap().len(), 1);
        assert_eq!(storage.rows("text_translations").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_deletes_persisted_blank() {
        let backend = backend();
        let storage = MemoryStorage::new();
        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.save(&mut post, &storage).await.unwrap();

        backend.write(&mut post, "title", "en", None).unwrap();
        backend.save(&mut post, &storage).await.unwrap();

        assert!(storage.rows("string_translations").unwrap().is_empty());
        assert!(post
            .translations()
            .get("string_translations")
            .is_some_and(|a| a.pending_deletes().is_empty()));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_pending_deletes() {
        let backend = backend();
        let storage = MemoryStorage::new();
        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.save(&mut post, &storage).await.unwrap();

        backend.write(&mut post, "title", "en", Some("")).unwrap();
        storage.fail_next_commit("connection reset").unwrap();
        assert!(backend.save(&mut post, &storage).await.is_err());
        assert_eq!(storage.rows("string_translations").unwrap().len(), 1);

        backend.save(&mut post, &storage).await.unwrap();
        assert!(storage.rows("string_translations").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_is_scoped_to_declared_keys() {
        let backend = backend();
        let storage = MemoryStorage::new();
        let mut stray =
            TranslationRecord::build(OwnerRef::new("Post", 1), "legacy", Locale::from("en"));
        stray.value = Some("old".to_string());
        storage.insert_raw("string_translations", stray).unwrap();

        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.save(&mut post, &storage).await.unwrap();

        let mut reloaded = Post::new(1);
        backend.load(&mut reloaded, &storage).await.unwrap();
        let keys: Vec<&str> = reloaded
            .translations()
            .records("string_translations")
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["title"]);
    }

    #[tokio::test]
    async fn test_cascade_covers_undeclared_shapes() {
        let mut backend = KeyValueBackend::new("Post", "posts");
        backend
            .declare_translated(["title"], &BackendOptions::new().with_type("string"))
            .unwrap();
        let storage = MemoryStorage::new();
        let owner = OwnerRef::new("Post", 1);
        let mut body = TranslationRecord::build(owner.clone(), "content", Locale::from("en"));
        body.value = Some("x".to_string());
        storage.insert_raw("text_translations", body).unwrap();

        let mut post = Post::new(1);
        backend.write(&mut post, "title", "en", Some("Hi")).unwrap();
        backend.save(&mut post, &storage).await.unwrap();

        let report = backend.cascade_delete(&mut post, &storage).await;
        assert!(report.is_complete());
        assert_eq!(report.deleted, 2);
        assert_eq!(storage.count_for_owner(&owner).unwrap(), 0);
        assert!(post.translations().iter().next().is_none());
    }

    #[tokio::test]
    async fn test_cascade_retries_then_reports() {
        let storage = MemoryStorage::new();
        let backend = backend().with_cascade_retry(RetryConfig::once());
        let mut post = Post::new(1);
        storage.fail_next_deletes(1).unwrap();

        let report = backend.cascade_delete(&mut post, &storage).await;
        assert_eq!(report.failed_tables.len(), 1);
        assert_eq!(backend.metrics().report().cascade_failures, 1);

        let retrying = backend_with_retry();
        storage.fail_next_deletes(1).unwrap();
        assert!(retrying.cascade_delete(&mut post, &storage).await.is_complete());
    }

    fn backend_with_retry() -> KeyValueBackend {
        backend().with_cascade_retry(RetryConfig::new(2, std::time::Duration::from_millis(1)))
    }

    #[test]
    fn test_duplicate_translations_are_independent() {
        let backend = backend();
        let mut source = Post::new(1);
        backend.write(&mut source, "title", "en", Some("Hi")).unwrap();
        let mut copy = Post::new(2);

        assert_eq!(backend.duplicate_translations(&source, &mut copy), 1);
        backend.write(&mut copy, "title", "en", Some("Changed")).unwrap();

        assert_eq!(backend.read(&mut source, "title", "en").unwrap().as_deref(), Some("Hi"));
        let copied = &copy.translations().records("string_translations")[0];
        assert_eq!(copied.owner, OwnerRef::new("Post", 2));
        assert!(!copied.is_persisted());
    }

    #[test]
    fn test_build_locale_predicate() {
        let backend = backend();
        let predicate = backend
            .build_locale_predicate(
                "string_translations",
                "title",
                LocaleSelection::fallbacks(["fr", "en"]),
                CompareOp::Eq,
                "Hi",
            )
            .unwrap();
        let columns = predicate.columns();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].locales.len(), 2);
        assert_eq!(columns[0].table, "string_translations");

        assert!(backend
            .build_locale_predicate("text_translations", "title", "en", CompareOp::Eq, "Hi")
            .is_err());
    }
}

//! Attribute scopes: which attribute keys belong to each association.
//!
//! Several attribute groups can share one translation table. Loading an
//! association or querying through it is restricted to the keys declared
//! under that association name, so rows written by unrelated groups stay
//! invisible.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct AttributeScopes {
    scopes: BTreeMap<String, BTreeSet<String>>,
}

impl AttributeScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `attributes` into the scope of `association`.
    ///
    /// Repeated declarations accumulate; earlier keys are never dropped.
    pub fn register<I, S>(&mut self, association: &str, attributes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = self.scopes.entry(association.to_string()).or_default();
        for attribute in attributes {
            keys.insert(attribute.as_ref().to_string());
        }
    }

    /// Current key set for `association` (empty if never registered).
    pub fn scope_filter(&self, association: &str) -> BTreeSet<String> {
        self.scopes.get(association).cloned().unwrap_or_default()
    }

    pub fn contains(&self, association: &str, attribute: &str) -> bool {
        self.scopes
            .get(association)
            .is_some_and(|keys| keys.contains(attribute))
    }

    /// Association whose scope holds `attribute`, if any.
    pub fn association_for(&self, attribute: &str) -> Option<&str> {
        self.scopes
            .iter()
            .find(|(_, keys)| keys.contains(attribute))
            .map(|(name, _)| name.as_str())
    }

    pub fn associations(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_same_attribute_twice_keeps_one() {
        let mut scopes = AttributeScopes::new();
        scopes.register("translations", ["title"]);
        scopes.register("translations", ["title"]);

        assert_eq!(scopes.scope_filter("translations"), keys(&["title"]));
    }

    #[test]
    fn test_register_accumulates_across_calls() {
        let mut scopes = AttributeScopes::new();
        scopes.register("translations", ["title"]);
        scopes.register("translations", ["body"]);

        assert_eq!(scopes.scope_filter("translations"), keys(&["title", "body"]));
    }

    #[test]
    fn test_scopes_are_isolated_per_association() {
        let mut scopes = AttributeScopes::new();
        scopes.register("text_translations", ["title", "body"]);
        scopes.register("string_translations", ["slug"]);

        assert_eq!(scopes.scope_filter("string_translations"), keys(&["slug"]));
        assert!(!scopes.contains("string_translations", "title"));
        assert!(scopes.contains("text_translations", "body"));
    }

    #[test]
    fn test_unknown_association_has_empty_scope() {
        let scopes = AttributeScopes::new();
        assert!(scopes.scope_filter("missing").is_empty());
        assert_eq!(scopes.association_for("title"), None);
    }

    #[test]
    fn test_association_for() {
        let mut scopes = AttributeScopes::new();
        scopes.register("text_translations", ["body"]);
        scopes.register("string_translations", ["title"]);

        assert_eq!(scopes.association_for("title"), Some("string_translations"));
        assert_eq!(scopes.association_for("body"), Some("text_translations"));
        assert_eq!(scopes.associations().count(), 2);
    }

    proptest! {
        #[test]
        fn prop_scope_is_union_of_all_registrations(
            batches in prop::collection::vec(prop::collection::vec("[a-z]{1,6}", 0..5), 0..6)
        ) {
            let mut scopes = AttributeScopes::new();
            let mut expected = BTreeSet::new();
            for batch in &batches {
                scopes.register("translations", batch);
                expected.extend(batch.iter().cloned());
                // Never older than the latest registration
                prop_assert_eq!(scopes.scope_filter("translations"), expected.clone());
            }
        }
    }
}

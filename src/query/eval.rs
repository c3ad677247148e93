//! In-memory evaluation of translation predicates.
//!
//! Follows SQL three-valued logic so that engines evaluating predicates in
//! memory agree with the rendered SQL: a comparison against a missing
//! value is unknown (`None`), and only `Some(true)` selects an owner.
//! String ordering is byte order (the "C" collation).

use super::predicate::{CompareOp, JoinTarget, Predicate, QueryValue, TranslatedColumn};
use std::cmp::Ordering;

impl TranslatedColumn {
    /// Value of this column for one owner: first non-null over the locales.
    pub fn resolve<F>(&self, lookup: &F) -> Option<String>
    where
        F: Fn(&JoinTarget) -> Option<String>,
    {
        self.targets().iter().find_map(lookup)
    }
}

impl Predicate {
    /// Evaluate for one owner, `lookup` returning that owner's value for a
    /// join target.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<bool>
    where
        F: Fn(&JoinTarget) -> Option<String>,
    {
        match self {
            Predicate::True => Some(true),
            Predicate::False => Some(false),
            Predicate::And(items) => {
                let mut unknown = false;
                for item in items {
                    match item.evaluate(lookup) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown { None } else { Some(true) }
            }
            Predicate::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match item.evaluate(lookup) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown { None } else { Some(false) }
            }
            Predicate::Not(inner) => inner.evaluate(lookup).map(|b| !b),
            Predicate::Compare(cmp) => {
                let actual = cmp.column.resolve(lookup);
                compare(actual.as_deref(), cmp.op, &cmp.value)
            }
        }
    }

    /// Whether the owner is selected.
    pub fn matches<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&JoinTarget) -> Option<String>,
    {
        self.evaluate(lookup) == Some(true)
    }
}

fn compare(actual: Option<&str>, op: CompareOp, expected: &QueryValue) -> Option<bool> {
    match (op, expected) {
        (CompareOp::Eq, QueryValue::Null) => return Some(actual.is_none()),
        (CompareOp::Ne, QueryValue::Null) => return Some(actual.is_some()),
        _ => {}
    }

    let actual = actual?;
    let result = match (op, expected) {
        (CompareOp::Eq, QueryValue::Text(v)) => actual == v,
        (CompareOp::Ne, QueryValue::Text(v)) => actual != v,
        (CompareOp::Lt, QueryValue::Text(v)) => actual.cmp(v.as_str()) == Ordering::Less,
        (CompareOp::Lte, QueryValue::Text(v)) => actual.cmp(v.as_str()) != Ordering::Greater,
        (CompareOp::Gt, QueryValue::Text(v)) => actual.cmp(v.as_str()) == Ordering::Greater,
        (CompareOp::Gte, QueryValue::Text(v)) => actual.cmp(v.as_str()) != Ordering::Less,
        (CompareOp::In, QueryValue::List(items)) => items.iter().any(|i| i == actual),
        (CompareOp::NotIn, QueryValue::List(items)) => !items.iter().any(|i| i == actual),
        (CompareOp::Contains, QueryValue::Text(v)) => actual.contains(v.as_str()),
        (CompareOp::StartsWith, QueryValue::Text(v)) => actual.starts_with(v.as_str()),
        (CompareOp::EndsWith, QueryValue::Text(v)) => actual.ends_with(v.as_str()),
        // Rejected when the comparison is built
        _ => return None,
    };
    Some(result)
}

/// Order two resolved values the way Postgres does by default: nulls sort
/// after every value ascending, before every value descending.
pub fn order_nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::query::predicate::TranslatedCompare;
    use std::collections::HashMap;

    fn column(attribute: &str, locales: &[&str]) -> TranslatedColumn {
        TranslatedColumn {
            table: "text_translations".to_string(),
            association: "text_translations".to_string(),
            attribute: attribute.to_string(),
            locales: locales.iter().map(|l| Locale::from(*l)).collect(),
        }
    }

    fn cmp(attribute: &str, locales: &[&str], op: CompareOp, value: QueryValue) -> Predicate {
        Predicate::Compare(TranslatedCompare::new(column(attribute, locales), op, value).unwrap())
    }

    fn owner(rows: &[(&str, &str, &str)]) -> impl Fn(&JoinTarget) -> Option<String> {
        let map: HashMap<(String, String), String> = rows
            .iter()
            .map(|(a, l, v)| ((a.to_string(), l.to_string()), v.to_string()))
            .collect();
        move |t: &JoinTarget| {
            map.get(&(t.attribute.clone(), t.locale.to_string()))
                .cloned()
        }
    }

    #[test]
    fn test_fallback_picks_first_available_locale() {
        let o1 = owner(&[("title", "en", "Hi")]);
        let o2 = owner(&[("title", "fr", "Salut")]);
        let p = cmp("title", &["fr", "en"], CompareOp::Eq, "Hi".into());

        assert!(p.matches(&o1));
        assert!(!p.matches(&o2));
    }

    #[test]
    fn test_fallback_prefers_earlier_locale_even_if_later_matches() {
        let both = owner(&[("title", "fr", "Salut"), ("title", "en", "Hi")]);
        let p = cmp("title", &["fr", "en"], CompareOp::Eq, "Hi".into());
        assert!(!p.matches(&both));
    }

    #[test]
    fn test_eq_null_matches_missing_translation() {
        let empty = owner(&[]);
        let has = owner(&[("title", "en", "x")]);
        let missing = cmp("title", &["en"], CompareOp::Eq, QueryValue::Null);
        let present = cmp("title", &["en"], CompareOp::Ne, QueryValue::Null);

        assert!(missing.matches(&empty));
        assert!(!missing.matches(&has));
        assert!(present.matches(&has));
        assert!(!present.matches(&empty));
    }

    #[test]
    fn test_comparison_with_missing_value_is_unknown() {
        let empty = owner(&[]);
        let p = cmp("title", &["en"], CompareOp::Ne, "x".into());
        assert_eq!(p.evaluate(&empty), None);
        // NOT unknown is still unknown
        assert_eq!(p.clone().negate().evaluate(&empty), None);
        assert!(!p.negate().matches(&empty));
    }

    #[test]
    fn test_attributes_resolve_independently() {
        let o = owner(&[("title", "en", "A"), ("body", "en", "B")]);
        let both = cmp("title", &["en"], CompareOp::Eq, "A".into())
            .and(cmp("body", &["en"], CompareOp::Eq, "B".into()));
        let crossed = cmp("title", &["en"], CompareOp::Eq, "B".into())
            .or(cmp("body", &["en"], CompareOp::Eq, "A".into()));

        assert!(both.matches(&o));
        assert!(!crossed.matches(&o));
    }

    #[test]
    fn test_three_valued_and_or() {
        let o = owner(&[("title", "en", "A")]);
        let unknown = cmp("body", &["en"], CompareOp::Eq, "x".into());
        let yes = cmp("title", &["en"], CompareOp::Eq, "A".into());
        let no = cmp("title", &["en"], CompareOp::Eq, "Z".into());

        assert_eq!(unknown.clone().or(yes.clone()).evaluate(&o), Some(true));
        assert_eq!(unknown.clone().or(no.clone()).evaluate(&o), None);
        assert_eq!(unknown.clone().and(no).evaluate(&o), Some(false));
        assert_eq!(unknown.and(yes).evaluate(&o), None);
    }

    #[test]
    fn test_string_operators() {
        let o = owner(&[("title", "en", "Hello world")]);
        assert!(cmp("title", &["en"], CompareOp::Contains, "lo wo".into()).matches(&o));
        assert!(cmp("title", &["en"], CompareOp::StartsWith, "Hell".into()).matches(&o));
        assert!(cmp("title", &["en"], CompareOp::EndsWith, "world".into()).matches(&o));
        assert!(cmp("title", &["en"], CompareOp::Gt, "Apple".into()).matches(&o));
        assert!(cmp("title", &["en"], CompareOp::Lte, "Hello world".into()).matches(&o));
        assert!(!cmp("title", &["en"], CompareOp::Lt, "Hello world".into()).matches(&o));
        assert!(cmp(
            "title",
            &["en"],
            CompareOp::In,
            vec!["x".to_string(), "Hello world".to_string()].into()
        )
        .matches(&o));
        assert!(!cmp("title", &["en"], CompareOp::NotIn, vec!["Hello world".to_string()].into())
            .matches(&o));
    }

    #[test]
    fn test_order_nulls_last() {
        assert_eq!(order_nulls_last(Some("a"), Some("b")), Ordering::Less);
        assert_eq!(order_nulls_last(Some("a"), None), Ordering::Less);
        assert_eq!(order_nulls_last(None, Some("a")), Ordering::Greater);
        assert_eq!(order_nulls_last(None, None), Ordering::Equal);
    }
}

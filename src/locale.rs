//! Locale tags and locale selections.
//!
//! Locales are not validated here: callers own the meaning of a tag. Two
//! locales are equal when their string forms are equal, so `"en"` built from
//! a `&str` and from a `String` compare the same.

use crate::error::{Result, TranslationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A locale tag in its canonical string form (e.g. "en", "pt-BR").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    /// Create a locale from any string-like tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Locale(tag.into())
    }

    /// Get the locale tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Locale {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Locale {
    fn from(tag: &str) -> Self {
        Locale::new(tag)
    }
}

impl From<String> for Locale {
    fn from(tag: String) -> Self {
        Locale(tag)
    }
}

impl From<&Locale> for Locale {
    fn from(locale: &Locale) -> Self {
        locale.clone()
    }
}

/// Which locale(s) a query reads an attribute through.
///
/// A fallback sequence is ordered: the first locale holding a value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocaleSelection {
    Single(Locale),
    Fallbacks(Vec<Locale>),
}

impl LocaleSelection {
    /// Build a fallback selection from an ordered list of tags.
    pub fn fallbacks<I, L>(locales: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locale>,
    {
        LocaleSelection::Fallbacks(locales.into_iter().map(Into::into).collect())
    }

    /// Resolve the selection into the ordered candidate list.
    ///
    /// Repeated locales are dropped (first occurrence kept).
    ///
    /// # Errors
    /// Returns `InvalidPredicate` for an empty fallback sequence.
    pub fn candidates(&self) -> Result<Vec<Locale>> {
        match self {
            LocaleSelection::Single(locale) => Ok(vec![locale.clone()]),
            LocaleSelection::Fallbacks(locales) => {
                let mut out: Vec<Locale> = Vec::with_capacity(locales.len());
                for locale in locales {
                    if !out.contains(locale) {
                        out.push(locale.clone());
                    }
                }
                if out.is_empty() {
                    return Err(TranslationError::InvalidPredicate(
                        "fallback sequence must name at least one locale".to_string(),
                    ));
                }
                Ok(out)
            }
        }
    }
}

impl From<Locale> for LocaleSelection {
    fn from(locale: Locale) -> Self {
        LocaleSelection::Single(locale)
    }
}

impl From<&str> for LocaleSelection {
    fn from(tag: &str) -> Self {
        LocaleSelection::Single(Locale::new(tag))
    }
}

impl From<Vec<Locale>> for LocaleSelection {
    fn from(locales: Vec<Locale>) -> Self {
        LocaleSelection::Fallbacks(locales)
    }
}

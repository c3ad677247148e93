//! Error types for the translation backend.
//!
//! Setup problems are `ConfigError` and surface from `declare_translated`
//! before any record exists. Runtime problems are `TranslationError`.

use thiserror::Error;

/// Fatal configuration errors raised while declaring translated attributes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("KeyValue backend requires an explicit type option, either text or string")]
    MissingType,

    #[error("You must define a {expected} record shape (no shape registered for type '{tag}')")]
    UnknownShape { tag: String, expected: String },

    #[error("Record shape '{0}' is already registered")]
    DuplicateShape(String),

    #[error("Default options may not contain the following reserved key: {0}")]
    ReservedOptionKey(String),

    #[error("Invalid value for option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },
}

/// Errors from storage engines.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "Duplicate translation for {owner_type}#{owner_id} key '{key}' locale '{locale}' in {table}"
    )]
    UniqueViolation {
        table: String,
        owner_type: String,
        owner_id: i64,
        key: String,
        locale: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Runtime errors from the translation backend.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Attribute '{attribute}' is not declared as translated")]
    UndeclaredAttribute { attribute: String },

    #[error("{count} live translations for {owner} key '{key}' locale '{locale}'")]
    DuplicateTranslation {
        owner: String,
        key: String,
        locale: String,
        count: usize,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T, E = TranslationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_shape_message_names_expected_shape() {
        let err = ConfigError::UnknownShape {
            tag: "json".to_string(),
            expected: "JsonTranslation".to_string(),
        };
        assert!(err.to_string().contains("You must define a JsonTranslation"));
    }

    #[test]
    fn test_reserved_key_message() {
        let err = ConfigError::ReservedOptionKey("backend".to_string());
        assert_eq!(
            err.to_string(),
            "Default options may not contain the following reserved key: backend"
        );
    }

    #[test]
    fn test_config_error_converts_transparently() {
        let err: TranslationError = ConfigError::MissingType.into();
        assert_eq!(
            err.to_string(),
            "KeyValue backend requires an explicit type option, either text or string"
        );
    }
}

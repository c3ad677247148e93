use crate::error::ConfigError;
use crate::locale::Locale;
use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Option keys that default options may not carry.
pub const RESERVED_OPTION_KEYS: &[&str] = &["backend", "model_class"];

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: Option<String>,

    // Locales
    pub default_locale: Locale,

    // Declarations
    pub default_type: String,

    // Cascade delete retries
    pub cascade_max_attempts: u32,
    pub cascade_retry_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cascade_max_attempts =
            parse_max_attempts(std::env::var("CASCADE_MAX_ATTEMPTS").ok().as_deref())?;
        let cascade_retry_delay_ms =
            parse_retry_delay_ms(std::env::var("CASCADE_RETRY_DELAY_MS").ok().as_deref())?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            default_locale: Locale::new(
                std::env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "en".to_string()),
            ),
            default_type: std::env::var("TRANSLATION_DEFAULT_TYPE")
                .unwrap_or_else(|_| "text".to_string()),
            cascade_max_attempts,
            cascade_retry_delay_ms,
        })
    }

    /// Database URL, required by anything that talks to Postgres.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL not set")
    }

    /// Default options with the configured default type filled in.
    pub fn default_options(&self) -> Result<DefaultOptions, ConfigError> {
        let mut options = DefaultOptions::default();
        options.set("type", Value::String(self.default_type.clone()))?;
        Ok(options)
    }

    /// Retry policy for post-destroy cascade deletes.
    pub fn cascade_retry(&self) -> RetryConfig {
        let initial = Duration::from_millis(self.cascade_retry_delay_ms);
        RetryConfig::new(self.cascade_max_attempts, initial)
            .with_max_delay(initial.saturating_mul(8))
    }
}

fn parse_max_attempts(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(3);
    };
    let attempts = raw
        .trim()
        .parse::<u32>()
        .context("CASCADE_MAX_ATTEMPTS must be a positive integer")?;
    if attempts == 0 {
        anyhow::bail!("CASCADE_MAX_ATTEMPTS must be at least 1");
    }
    Ok(attempts)
}

fn parse_retry_delay_ms(raw: Option<&str>) -> Result<u64> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .context("CASCADE_RETRY_DELAY_MS must be a whole number of milliseconds"),
        None => Ok(100),
    }
}

/// Options merged under every attribute declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultOptions {
    options: BTreeMap<String, Value>,
}

impl DefaultOptions {
    /// Options with no entries at all.
    pub fn empty() -> Self {
        Self {
            options: BTreeMap::new(),
        }
    }

    /// Set an option.
    ///
    /// # Errors
    /// `ReservedOptionKey` for `backend` and `model_class`.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        if RESERVED_OPTION_KEYS.contains(&key) {
            return Err(ConfigError::ReservedOptionKey(key.to_string()));
        }
        self.options.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Boolean option; `None` when unset or null.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ConfigError::InvalidOption {
                key: key.to_string(),
                reason: format!("expected a boolean, got {}", other),
            }),
        }
    }

    /// String option; `None` when unset or null.
    pub fn string(&self, key: &str) -> Result<Option<&str>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ConfigError::InvalidOption {
                key: key.to_string(),
                reason: format!("expected a string, got {}", other),
            }),
        }
    }
}

impl Default for DefaultOptions {
    fn default() -> Self {
        let mut options = BTreeMap::new();
        options.insert("presence".to_string(), Value::Bool(true));
        // Present but off until a read asks for it
        options.insert("fallbacks".to_string(), Value::Null);
        Self { options }
    }
}

/// Options for one `declare_translated` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendOptions {
    pub type_tag: Option<String>,
    pub association_name: Option<String>,
    pub shape: Option<String>,
    pub presence: Option<bool>,
}

/// Declaration options after merging defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub association_name: String,
    pub shape_tag: String,
    pub presence: bool,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape type tag, e.g. "string" or "text".
    pub fn with_type(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = Some(tag.into());
        self
    }

    pub fn with_association_name(mut self, name: impl Into<String>) -> Self {
        self.association_name = Some(name.into());
        self
    }

    /// Use an explicit shape tag instead of the one implied by the type.
    pub fn with_shape(mut self, tag: impl Into<String>) -> Self {
        self.shape = Some(tag.into());
        self
    }

    pub fn with_presence(mut self, presence: bool) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Merge with defaults and derive the association name.
    ///
    /// A type (given here or in defaults) implies the shape tag and the
    /// `<type>_translations` association name. Without a type, both an
    /// explicit shape and an association name are required.
    pub fn resolve(&self, defaults: &DefaultOptions) -> Result<ResolvedOptions, ConfigError> {
        let type_tag = match &self.type_tag {
            Some(tag) => Some(tag.clone()),
            None => defaults.string("type")?.map(str::to_string),
        };
        let presence = match self.presence {
            Some(p) => p,
            None => defaults.flag("presence")?.unwrap_or(true),
        };

        let (shape_tag, association_name) = match (type_tag, &self.shape, &self.association_name)
        {
            (Some(tag), shape, association) => (
                shape.clone().unwrap_or_else(|| tag.clone()),
                association
                    .clone()
                    .unwrap_or_else(|| format!("{}_translations", tag)),
            ),
            (None, Some(shape), Some(association)) => (shape.clone(), association.clone()),
            (None, _, _) => return Err(ConfigError::MissingType),
        };

        if association_name.trim().is_empty() {
            return Err(ConfigError::InvalidOption {
                key: "association_name".to_string(),
                reason: "must not be blank".to_string(),
            });
        }

        Ok(ResolvedOptions {
            association_name,
            shape_tag,
            presence,
        })
    }
}

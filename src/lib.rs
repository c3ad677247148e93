//! Key-value translation storage.
//!
//! Translated attribute values live outside the owner's own table, one row
//! per (owner, attribute, locale), in a small set of shared translation
//! tables keyed by value shape (`string_translations`, `text_translations`).
//!
//! ```rust,ignore
//! let mut backend = KeyValueBackend::new("Post", "posts");
//! backend.declare_translated(["title"], &BackendOptions::new().with_type("string"))?;
//!
//! backend.write(&mut post, "title", "en", Some("Hello"))?;
//! backend.save(&mut post, &storage).await?;
//!
//! let query = backend.query().filter(backend.build_locale_predicate(
//!     "string_translations",
//!     "title",
//!     LocaleSelection::fallbacks(["fr", "en"]),
//!     CompareOp::Eq,
//!     "Hello",
//! )?);
//! let ids = backend.find_owners(&query, &storage).await?;
//! ```

pub mod association;
pub mod backend;
pub mod config;
pub mod error;
pub mod locale;
pub mod metrics;
pub mod query;
pub mod record;
pub mod retry;
pub mod scope;
pub mod shape;
pub mod storage;

pub use association::{Association, Translatable, TranslationSet};
pub use backend::{AttributeGroup, CascadeReport, KeyValueBackend};
pub use config::{BackendOptions, Config, DefaultOptions};
pub use error::{ConfigError, Result, StorageError, TranslationError};
pub use locale::{Locale, LocaleSelection};
pub use query::{CompareOp, Predicate, QueryValue, SortDirection, TranslationQuery};
pub use record::{OwnerRef, TranslationRecord};
pub use shape::{RecordShape, ShapeRegistry, ValueKind};
pub use storage::{MemoryStorage, PgStorage, TranslationStorage};

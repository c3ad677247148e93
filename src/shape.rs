//! Record shape registry: maps a short type tag to a concrete translation
//! table description.
//!
//! Every attribute group names its shape by tag (`string`, `text`, ...).
//! Tags are resolved when the group is declared, so an unknown tag fails
//! setup instead of the first lookup.

use crate::error::ConfigError;
use std::collections::BTreeMap;

/// Column type used for the translation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Short values (`VARCHAR(255)`)
    String,
    /// Unbounded values (`TEXT`)
    Text,
}

impl ValueKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ValueKind::String => "VARCHAR(255)",
            ValueKind::Text => "TEXT",
        }
    }
}

/// Concrete description of one translation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    /// Short tag used in declarations (e.g. "string")
    pub tag: String,

    /// Shape name (e.g. "StringTranslation")
    pub name: String,

    /// Backing table name (e.g. "string_translations")
    pub table: String,

    pub kind: ValueKind,
}

impl RecordShape {
    /// Create a shape whose name and table derive from its tag.
    pub fn new(tag: &str, kind: ValueKind) -> Self {
        Self {
            tag: tag.to_string(),
            name: expected_shape_name(tag),
            table: format!("{}_translations", tag),
            kind,
        }
    }

    /// Override the backing table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// Shape name expected for a tag: `rich_text` -> `RichTextTranslation`.
pub fn expected_shape_name(tag: &str) -> String {
    let mut name: String = tag
        .split(|c: char| c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    name.push_str("Translation");
    name
}

/// Registry of the record shapes available to attribute groups.
#[derive(Debug, Clone)]
pub struct ShapeRegistry {
    shapes: BTreeMap<String, RecordShape>,
}

impl ShapeRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            shapes: BTreeMap::new(),
        }
    }

    /// Register a shape.
    ///
    /// # Errors
    /// `DuplicateShape` if a shape with the same tag already exists.
    pub fn register(&mut self, shape: RecordShape) -> Result<(), ConfigError> {
        if self.shapes.contains_key(&shape.tag) {
            return Err(ConfigError::DuplicateShape(shape.tag));
        }
        self.shapes.insert(shape.tag.clone(), shape);
        Ok(())
    }

    /// Resolve a tag to its shape.
    ///
    /// # Errors
    /// `UnknownShape`, naming the shape the caller must define.
    pub fn resolve(&self, tag: &str) -> Result<&RecordShape, ConfigError> {
        self.shapes.get(tag).ok_or_else(|| ConfigError::UnknownShape {
            tag: tag.to_string(),
            expected: expected_shape_name(tag),
        })
    }

    /// All registered shapes, ordered by tag.
    pub fn all(&self) -> impl Iterator<Item = &RecordShape> {
        self.shapes.values()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl Default for ShapeRegistry {
    /// The `string` and `text` shapes.
    fn default() -> Self {
        let mut shapes = BTreeMap::new();
        for shape in [
            RecordShape::new("string", ValueKind::String),
            RecordShape::new("text", ValueKind::Text),
        ] {
            shapes.insert(shape.tag.clone(), shape);
        }
        Self { shapes }
    }
}

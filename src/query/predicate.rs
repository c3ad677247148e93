use crate::error::{Result, TranslationError};
use crate::locale::Locale;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryValue {
    Null,
    Text(String),
    List(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<Option<&str>> for QueryValue {
    fn from(value: Option<&str>) -> Self {
        value.map_or(QueryValue::Null, QueryValue::from)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::List(values)
    }
}

/// One translation row joined to the owner: a single attribute in a single
/// locale. Distinct targets are distinct joins.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct JoinTarget {
    pub table: String,
    pub association: String,
    pub attribute: String,
    pub locale: Locale,
}

/// A translated attribute read through an ordered list of locales.
///
/// With more than one locale the first non-null value wins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranslatedColumn {
    pub table: String,
    pub association: String,
    pub attribute: String,
    pub locales: Vec<Locale>,
}

impl TranslatedColumn {
    /// One join target per candidate locale, in priority order.
    pub fn targets(&self) -> Vec<JoinTarget> {
        self.locales
            .iter()
            .map(|locale| JoinTarget {
                table: self.table.clone(),
                association: self.association.clone(),
                attribute: self.attribute.clone(),
                locale: locale.clone(),
            })
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranslatedCompare {
    pub(crate) column: TranslatedColumn,
    pub(crate) op: CompareOp,
    pub(crate) value: QueryValue,
}

impl TranslatedCompare {
    /// Pair a column with an operator and operand, checking they fit.
    pub fn new(column: TranslatedColumn, op: CompareOp, value: QueryValue) -> Result<Self> {
        let valid = match (op, &value) {
            (CompareOp::Eq | CompareOp::Ne, QueryValue::Null | QueryValue::Text(_)) => true,
            (CompareOp::In | CompareOp::NotIn, QueryValue::List(items)) => !items.is_empty(),
            (
                CompareOp::Lt
                | CompareOp::Lte
                | CompareOp::Gt
                | CompareOp::Gte
                | CompareOp::Contains
                | CompareOp::StartsWith
                | CompareOp::EndsWith,
                QueryValue::Text(_),
            ) => true,
            _ => false,
        };
        if !valid {
            return Err(TranslationError::InvalidPredicate(format!(
                "operator {:?} cannot compare '{}' against {:?}",
                op, column.attribute, value
            )));
        }
        Ok(Self { column, op, value })
    }

    pub fn column(&self) -> &TranslatedColumn {
        &self.column
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn value(&self) -> &QueryValue {
        &self.value
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(TranslatedCompare),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::False, p) | (p, Predicate::False) => p,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Every translated column referenced, in order of appearance.
    pub fn columns(&self) -> Vec<&TranslatedColumn> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a TranslatedColumn>) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::And(items) | Predicate::Or(items) => {
                for item in items {
                    item.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
            Predicate::Compare(cmp) => out.push(&cmp.column),
        }
    }
}

//! Locale-aware owner queries.
//!
//! A `TranslationQuery` filters and orders owners by translated values
//! without loading any translations. Every distinct (association,
//! attribute, locale) referenced becomes one LEFT JOIN against its
//! translation table; fallback reads coalesce over those joins in priority
//! order, so a whole fallback sequence is one query plan.

mod eval;
mod predicate;
pub(crate) mod sql;

pub use eval::order_nulls_last;
pub use predicate::{
    CompareOp, JoinTarget, Predicate, QueryValue, TranslatedColumn, TranslatedCompare,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: TranslatedColumn,
    pub direction: SortDirection,
}

/// Owners of one type filtered and ordered by translated attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationQuery {
    owner_table: String,
    owner_type: String,
    predicate: Predicate,
    order: Vec<OrderBy>,
    limit: Option<i64>,
}

impl TranslationQuery {
    /// Start a query over `owner_table`, whose rows are referenced from
    /// translation tables with the type tag `owner_type`.
    pub fn new(owner_table: impl Into<String>, owner_type: impl Into<String>) -> Self {
        Self {
            owner_table: owner_table.into(),
            owner_type: owner_type.into(),
            predicate: Predicate::True,
            order: Vec::new(),
            limit: None,
        }
    }

    /// AND a predicate onto the filter.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        let current = std::mem::replace(&mut self.predicate, Predicate::True);
        self.predicate = current.and(predicate);
        self
    }

    pub fn order_by(mut self, column: TranslatedColumn, direction: SortDirection) -> Self {
        self.order.push(OrderBy { column, direction });
        self
    }

    /// A negative limit selects nothing.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    pub fn owner_table(&self) -> &str {
        &self.owner_table
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    /// Distinct join targets used by the filter and the ordering, in order
    /// of first use.
    pub fn joins(&self) -> Vec<JoinTarget> {
        let mut joins: Vec<JoinTarget> = Vec::new();
        let columns = self
            .predicate
            .columns()
            .into_iter()
            .chain(self.order.iter().map(|o| &o.column));
        for column in columns {
            for target in column.targets() {
                if !joins.contains(&target) {
                    joins.push(target);
                }
            }
        }
        joins
    }
}

//! Postgres rendering for translation queries.
//!
//! Values are always bound parameters; identifiers (owner table, join
//! aliases, translation tables) are double-quoted.

use super::predicate::{
    CompareOp, JoinTarget, Predicate, QueryValue, TranslatedColumn, TranslatedCompare,
};
use super::{SortDirection, TranslationQuery};
use sqlx::{Postgres, QueryBuilder};
use std::collections::HashMap;

/// Column names shared by every translation table.
pub const OWNER_TYPE_COLUMN: &str = "translatable_type";
pub const OWNER_ID_COLUMN: &str = "translatable_id";
pub const KEY_COLUMN: &str = "key";
pub const LOCALE_COLUMN: &str = "locale";
pub const VALUE_COLUMN: &str = "value";

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape LIKE wildcards so the operand matches literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Join aliases by position in `TranslationQuery::joins()`: `t0`, `t1`, ...
///
/// Names built from association, attribute and locale can collide (and
/// Postgres truncates identifiers at 63 bytes), positions cannot.
struct JoinAliases {
    index: HashMap<JoinTarget, usize>,
}

impl JoinAliases {
    fn new(joins: &[JoinTarget]) -> Self {
        let index = joins
            .iter()
            .enumerate()
            .map(|(i, target)| (target.clone(), i))
            .collect();
        Self { index }
    }

    fn alias(&self, target: &JoinTarget) -> Option<String> {
        self.index.get(target).map(|i| format!("t{}", i))
    }
}

impl TranslationQuery {
    /// Render `SELECT <owner>.id FROM <owner> <joins> WHERE <filter>
    /// [ORDER BY ...] [LIMIT n]`.
    pub fn to_sql(&self) -> QueryBuilder<'static, Postgres> {
        let owner = quote_ident(self.owner_table());
        let aliases = JoinAliases::new(&self.joins());
        let mut qb = QueryBuilder::new(format!("SELECT {}.\"id\" FROM {}", owner, owner));
        self.push_joins(&mut qb);
        qb.push(" WHERE ");
        push_predicate(&mut qb, &aliases, self.predicate());

        if !self.ordering().is_empty() {
            qb.push(" ORDER BY ");
            for order in self.ordering() {
                push_value_expr(&mut qb, &aliases, &order.column);
                qb.push(match order.direction {
                    SortDirection::Asc => " ASC, ",
                    SortDirection::Desc => " DESC, ",
                });
            }
            qb.push(format!("{}.\"id\" ASC", owner));
        }

        if let Some(limit) = self.limit_value() {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        qb
    }

    /// Append one LEFT OUTER JOIN per distinct join target.
    pub fn push_joins<'args>(&self, qb: &mut QueryBuilder<'args, Postgres>) {
        for (i, target) in self.joins().iter().enumerate() {
            let alias = format!("t{}", i);
            push_join(qb, self.owner_table(), self.owner_type(), &alias, target);
        }
    }

    /// Append only the filter expression. The joins from `push_joins` must
    /// be part of the same statement.
    pub fn push_where<'args>(&self, qb: &mut QueryBuilder<'args, Postgres>) {
        let aliases = JoinAliases::new(&self.joins());
        push_predicate(qb, &aliases, self.predicate());
    }
}

fn push_join<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    owner_table: &str,
    owner_type: &str,
    alias: &str,
    target: &JoinTarget,
) {
    let alias = quote_ident(alias);
    qb.push(format!(
        " LEFT OUTER JOIN {} AS {} ON {}.{} = ",
        quote_ident(&target.table),
        alias,
        alias,
        OWNER_TYPE_COLUMN
    ));
    qb.push_bind(owner_type.to_string());
    qb.push(format!(
        " AND {}.{} = {}.\"id\" AND {}.\"{}\" = ",
        alias,
        OWNER_ID_COLUMN,
        quote_ident(owner_table),
        alias,
        KEY_COLUMN
    ));
    qb.push_bind(target.attribute.clone());
    qb.push(format!(" AND {}.{} = ", alias, LOCALE_COLUMN));
    qb.push_bind(target.locale.to_string());
}

fn push_value_expr<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    aliases: &JoinAliases,
    column: &TranslatedColumn,
) {
    // Every target of the query's columns is in `aliases`; a stray one reads as NULL
    let exprs: Vec<String> = column
        .targets()
        .iter()
        .map(|t| match aliases.alias(t) {
            Some(alias) => format!("{}.{}", quote_ident(&alias), VALUE_COLUMN),
            None => "NULL".to_string(),
        })
        .collect();
    if exprs.len() == 1 {
        qb.push(&exprs[0]);
    } else {
        qb.push(format!("COALESCE({})", exprs.join(", ")));
    }
}

fn push_predicate<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    aliases: &JoinAliases,
    predicate: &Predicate,
) {
    match predicate {
        Predicate::True => {
            qb.push("TRUE");
        }
        Predicate::False => {
            qb.push("FALSE");
        }
        Predicate::And(items) if items.is_empty() => {
            qb.push("TRUE");
        }
        Predicate::Or(items) if items.is_empty() => {
            qb.push("FALSE");
        }
        Predicate::And(items) => push_joined(qb, aliases, items, " AND "),
        Predicate::Or(items) => push_joined(qb, aliases, items, " OR "),
        Predicate::Not(inner) => {
            qb.push("NOT (");
            push_predicate(qb, aliases, inner);
            qb.push(")");
        }
        Predicate::Compare(cmp) => push_compare(qb, aliases, cmp),
    }
}

fn push_joined<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    aliases: &JoinAliases,
    items: &[Predicate],
    sep: &str,
) {
    qb.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            qb.push(sep);
        }
        push_predicate(qb, aliases, item);
    }
    qb.push(")");
}

fn push_compare<'args>(
    qb: &mut QueryBuilder<'args, Postgres>,
    aliases: &JoinAliases,
    cmp: &TranslatedCompare,
) {
    let (op, value) = (cmp.op(), cmp.value());
    let symbol = match (op, value) {
        (CompareOp::Eq, QueryValue::Null) => {
            push_value_expr(qb, aliases, cmp.column());
            qb.push(" IS NULL");
            return;
        }
        (CompareOp::Ne, QueryValue::Null) => {
            push_value_expr(qb, aliases, cmp.column());
            qb.push(" IS NOT NULL");
            return;
        }
        (CompareOp::In | CompareOp::NotIn, QueryValue::List(items)) => {
            push_value_expr(qb, aliases, cmp.column());
            qb.push(if op == CompareOp::In { " IN (" } else { " NOT IN (" });
            let mut separated = qb.separated(", ");
            for item in items {
                separated.push_bind(item.clone());
            }
            separated.push_unseparated(")");
            return;
        }
        (CompareOp::Eq, QueryValue::Text(_)) => " = ",
        (CompareOp::Ne, QueryValue::Text(_)) => " <> ",
        (CompareOp::Lt, QueryValue::Text(_)) => " < ",
        (CompareOp::Lte, QueryValue::Text(_)) => " <= ",
        (CompareOp::Gt, QueryValue::Text(_)) => " > ",
        (CompareOp::Gte, QueryValue::Text(_)) => " >= ",
        (
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith,
            QueryValue::Text(_),
        ) => " LIKE ",
        _ => {
            qb.push("FALSE");
            return;
        }
    };

    let QueryValue::Text(text) = value else {
        qb.push("FALSE");
        return;
    };
    let operand = match op {
        CompareOp::Contains => format!("%{}%", escape_like(text)),
        CompareOp::StartsWith => format!("{}%", escape_like(text)),
        CompareOp::EndsWith => format!("%{}", escape_like(text)),
        _ => text.clone(),
    };
    push_value_expr(qb, aliases, cmp.column());
    qb.push(symbol);
    qb.push_bind(operand);
}

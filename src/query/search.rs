//! Search compiler: a declarative field map plus the `search` parameter become one OR-predicate.

use super::date::parse_date;
use super::params::ParamValue;
use crate::schema::{Relation, Table};
use crate::store::{CompareOp, LikeAnchor, Predicate};
use chrono::NaiveDate;
use serde_json::Value;

/// How a search term is matched against a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Equal,
    Like(LikeAnchor),
    In,
    NotIn,
    Compare(CompareOp),
    Null,
    NotNull,
    Between,
    NotBetween,
    Date,
    DateRange,
}

impl Condition {
    /// Config spelling to condition. Unrecognized spellings fall back to substring match.
    pub fn parse(s: &str) -> Condition {
        match s.trim() {
            "equal" | "=" => Condition::Equal,
            "like%" => Condition::Like(LikeAnchor::Start),
            "%like" => Condition::Like(LikeAnchor::End),
            "%like%" | "like" => Condition::Like(LikeAnchor::Anywhere),
            "in" => Condition::In,
            "not_in" => Condition::NotIn,
            "greater" | ">" => Condition::Compare(CompareOp::Gt),
            "greater_equal" | ">=" => Condition::Compare(CompareOp::Gte),
            "less" | "<" => Condition::Compare(CompareOp::Lt),
            "less_equal" | "<=" => Condition::Compare(CompareOp::Lte),
            "not_equal" | "!=" => Condition::Compare(CompareOp::NotEq),
            "null" => Condition::Null,
            "not_null" => Condition::NotNull,
            "between" => Condition::Between,
            "not_between" => Condition::NotBetween,
            "date" => Condition::Date,
            "date_range" => Condition::DateRange,
            _ => Condition::Like(LikeAnchor::Anywhere),
        }
    }
}

/// One searchable (or sortable) logical field.
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub column: String,
    pub condition: Condition,
    /// Match through a related row instead of our own column.
    pub relation: Option<&'static Relation>,
}

/// Coerce a raw term to the column's type. None makes the condition inert.
fn typed(table: &Table, column: &str, raw: &str) -> Option<Value> {
    let ty = table.column_type(column)?;
    match ty.coerce(&Value::String(raw.trim().to_string()))? {
        Value::Null => None,
        v => Some(v),
    }
}

fn pair(value: &ParamValue) -> Option<(&str, &str)> {
    match value {
        ParamValue::List(v) if v.len() == 2 => Some((v[0].as_str(), v[1].as_str())),
        _ => None,
    }
}

/// Predicate for a single column under `condition`. None when the term does not fit the condition.
pub fn condition_predicate(
    table: &Table,
    column: &str,
    condition: Condition,
    value: &ParamValue,
    today: NaiveDate,
) -> Option<Predicate> {
    let column_s = column.to_string();
    match condition {
        Condition::Equal => Some(Predicate::Compare {
            column: column_s,
            op: CompareOp::Eq,
            value: typed(table, column, value.as_single()?)?,
        }),
        Condition::Compare(op) => Some(Predicate::Compare {
            column: column_s,
            op,
            value: typed(table, column, value.as_single()?)?,
        }),
        Condition::Like(anchor) => Some(Predicate::Like {
            column: column_s,
            needle: value.as_single()?.to_string(),
            anchor,
        }),
        Condition::In | Condition::NotIn => {
            let values = value
                .comma_list()
                .iter()
                .filter_map(|raw| typed(table, column, raw))
                .collect();
            Some(Predicate::In {
                column: column_s,
                values,
                negated: condition == Condition::NotIn,
            })
        }
        Condition::Null => Some(Predicate::is_null(column_s)),
        Condition::NotNull => Some(Predicate::not_null(column_s)),
        Condition::Between | Condition::NotBetween => {
            let (lo, hi) = pair(value)?;
            Some(Predicate::Between {
                column: column_s,
                low: typed(table, column, lo)?,
                high: typed(table, column, hi)?,
                negated: condition == Condition::NotBetween,
            })
        }
        Condition::Date => Some(Predicate::OnDate {
            column: column_s,
            date: parse_date(value.as_single()?, today)?,
        }),
        Condition::DateRange => {
            let (from, to) = pair(value)?;
            Some(Predicate::DateBetween {
                column: column_s,
                from: parse_date(from, today)?,
                to: parse_date(to, today)?,
            })
        }
    }
}

/// OR of every field's predicate for `search`. None when `search` is blank or every field is inert.
pub fn compile<'a, I>(table: &'static Table, fields: I, search: Option<&ParamValue>, today: NaiveDate) -> Option<Predicate>
where
    I: IntoIterator<Item = (&'a str, &'a FieldSpec)>,
{
    let search = search.filter(|s| !s.is_blank())?;
    let mut any = Vec::new();
    for (name, spec) in fields {
        let target = match spec.relation {
            Some(rel) => match rel.target() {
                Some(t) => t,
                None => continue,
            },
            None => table,
        };
        let Some(p) = condition_predicate(target, &spec.column, spec.condition, search, today) else {
            tracing::debug!(field = %name, "search term inert for field");
            continue;
        };
        any.push(match spec.relation {
            Some(relation) => Predicate::Has {
                relation,
                predicate: Box::new(p),
            },
            None => p,
        });
    }
    match any.len() {
        0 => None,
        1 => any.pop(),
        _ => Some(Predicate::Any(any)),
    }
}

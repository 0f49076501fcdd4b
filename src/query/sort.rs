//! Sort compiler: whitelist-checked `sort_by` / `sort_direction` to an ordering.

use super::search::FieldSpec;
use crate::store::{Direction, Order};
use std::collections::BTreeMap;

pub const DEFAULT_SORT_KEY: &str = "id";
pub const DEFAULT_DIRECTION: Direction = Direction::Desc;

/// Permitted sort keys: plain columns, or logical fields mapped to a column (optionally through a to-one relation).
#[derive(Clone, Debug)]
pub enum Sortable {
    Columns(Vec<String>),
    Fields(BTreeMap<String, FieldSpec>),
}

impl Default for Sortable {
    fn default() -> Self {
        Sortable::Columns(vec!["id".into(), "created_at".into(), "updated_at".into()])
    }
}

impl Sortable {
    fn lookup(&self, key: &str) -> Option<Order> {
        match self {
            Sortable::Columns(cols) => cols.iter().any(|c| c == key).then(|| Order {
                column: key.to_string(),
                relation: None,
                direction: DEFAULT_DIRECTION,
            }),
            Sortable::Fields(fields) => fields.get(key).map(|f| Order {
                column: f.column.clone(),
                relation: f.relation,
                direction: DEFAULT_DIRECTION,
            }),
        }
    }
}

fn id_desc() -> Order {
    Order {
        column: "id".into(),
        relation: None,
        direction: Direction::Desc,
    }
}

/// Ordering for a request. Unlisted keys fall back to `id desc`; an invalid direction falls back to desc.
pub fn compile(sortable: &Sortable, sort_by: Option<&str>, sort_direction: Option<&str>) -> Vec<Order> {
    let key = sort_by.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SORT_KEY);
    let direction = match sort_direction {
        None => DEFAULT_DIRECTION,
        Some(d) => Direction::parse(d).unwrap_or_else(|| {
            tracing::debug!(direction = %d, "invalid sort direction ignored");
            DEFAULT_DIRECTION
        }),
    };
    let Some(mut order) = sortable.lookup(key) else {
        if key != DEFAULT_SORT_KEY {
            tracing::warn!(sort_by = %key, "sort key not whitelisted; using default order");
        }
        return vec![id_desc()];
    };
    order.direction = direction;
    if order.relation.is_none() && order.column == "id" {
        return vec![order];
    }
    vec![order, id_desc()]
}

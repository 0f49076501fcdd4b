//! In-process store with the same query semantics as the PostgreSQL backend.
//! Used when no database is configured, and by the test suites.

use super::{check_query, prepare_write, CompareOp, Direction, GeoPoint, LikeAnchor, Order, Predicate, Query, Store, Trashed};
use crate::error::StoreError;
use crate::schema::{parse_timestamp, ColumnType, OwnerType, Relation, RelationKind, Row, Table};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Data {
    tables: HashMap<&'static str, BTreeMap<i64, Row>>,
    sequences: HashMap<&'static str, i64>,
}

impl Data {
    fn rows(&self, table: &str) -> impl Iterator<Item = &Row> {
        self.tables.get(table).into_iter().flat_map(|t| t.values())
    }

    fn get(&self, table: &str, id: i64) -> Option<&Row> {
        self.tables.get(table).and_then(|t| t.get(&id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Data>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Data>, StoreError> {
        self.data.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Data>, StoreError> {
        self.data.write().map_err(|_| StoreError::Poisoned)
    }
}

fn visible(table: &Table, row: &Row, trashed: Trashed) -> bool {
    if !table.soft_deletes {
        return true;
    }
    match trashed {
        Trashed::Exclude => !row.is_trashed(),
        Trashed::Include => true,
        Trashed::Only => row.is_trashed(),
    }
}

fn matching<'a>(data: &'a Data, query: &Query) -> Vec<&'a Row> {
    data.rows(query.table.name)
        .filter(|row| visible(query.table, row, query.trashed))
        .filter(|row| query.predicates.iter().all(|p| eval(data, query.table, row, p)))
        .collect()
}

/// Related rows of `row` through `relation`, trashed targets excluded.
fn related<'a>(data: &'a Data, row: &Row, relation: &Relation) -> (Option<&'static Table>, Vec<&'a Row>) {
    let (target, rows): (Option<&'static Table>, Vec<&Row>) = match relation.kind {
        RelationKind::BelongsTo { foreign_key, .. } => {
            let target = relation.target();
            let rows = match (target, row.get(foreign_key).as_i64()) {
                (Some(t), Some(fk)) => data.get(t.name, fk).into_iter().collect(),
                _ => Vec::new(),
            };
            (target, rows)
        }
        RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
            let target = relation.target();
            let rows = target
                .map(|t| {
                    data.rows(t.name)
                        .filter(|r| r.get(foreign_key).as_i64() == Some(row.id))
                        .collect()
                })
                .unwrap_or_default();
            (target, rows)
        }
        RelationKind::MorphMany { morph, owner, .. } => {
            let target = relation.target();
            let id_col = format!("{}_id", morph);
            let type_col = format!("{}_type", morph);
            let rows = target
                .map(|t| {
                    data.rows(t.name)
                        .filter(|r| r.get(&id_col).as_i64() == Some(row.id))
                        .filter(|r| r.str_attr(&type_col) == Some(owner.as_str()))
                        .collect()
                })
                .unwrap_or_default();
            (target, rows)
        }
        RelationKind::MorphTo { morph } => {
            let owner = row
                .str_attr(&format!("{}_type", morph))
                .and_then(|s| s.parse::<OwnerType>().ok());
            let id = row.get(&format!("{}_id", morph)).as_i64();
            match (owner, id) {
                (Some(owner), Some(id)) => (Some(owner.table()), data.get(owner.table().name, id).into_iter().collect()),
                _ => (None, Vec::new()),
            }
        }
    };
    let rows = match target {
        Some(t) if t.soft_deletes => rows.into_iter().filter(|r| !r.is_trashed()).collect(),
        _ => rows,
    };
    (target, rows)
}

/// Compare two values as the given column type. None when either side is null or not comparable.
fn compare(ty: ColumnType, a: &Value, b: &Value) -> Option<Ordering> {
    let a = ty.coerce(a)?;
    let b = ty.coerce(b)?;
    match (ty, &a, &b) {
        (_, Value::Null, _) | (_, _, Value::Null) => None,
        (ColumnType::BigInt, _, _) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        (ColumnType::Bool, _, _) => Some(a.as_bool()?.cmp(&b.as_bool()?)),
        (ColumnType::Timestamp, _, _) => Some(parse_timestamp(a.as_str()?)?.cmp(&parse_timestamp(b.as_str()?)?)),
        (ColumnType::Text, _, _) => Some(a.as_str()?.cmp(b.as_str()?)),
    }
}

fn date_of(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_timestamp).map(|t| t.date_naive())
}

fn text_of(value: &Value) -> Option<String> {
    match ColumnType::Text.coerce(value)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn eval(data: &Data, table: &'static Table, row: &Row, predicate: &Predicate) -> bool {
    let ty = |column: &str| table.column_type(column).unwrap_or(ColumnType::Text);
    match predicate {
        Predicate::Compare { column, op, value } => match compare(ty(column), &row.get(column), value) {
            None => false,
            Some(ord) => match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::NotEq => ord != Ordering::Equal,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
            },
        },
        Predicate::Like { column, needle, anchor } => {
            let Some(hay) = text_of(&row.get(column)) else {
                return false;
            };
            let hay = hay.to_lowercase();
            let needle = needle.to_lowercase();
            match anchor {
                LikeAnchor::Start => hay.starts_with(&needle),
                LikeAnchor::End => hay.ends_with(&needle),
                LikeAnchor::Anywhere => hay.contains(&needle),
            }
        }
        Predicate::In { column, values, negated } => {
            let v = row.get(column);
            if v.is_null() {
                return false;
            }
            let found = values
                .iter()
                .any(|x| compare(ty(column), &v, x) == Some(Ordering::Equal));
            found != *negated
        }
        Predicate::Null { column, negated } => row.get(column).is_null() != *negated,
        Predicate::Between { column, low, high, negated } => {
            let v = row.get(column);
            match (compare(ty(column), &v, low), compare(ty(column), &v, high)) {
                (Some(lo), Some(hi)) => (lo != Ordering::Less && hi != Ordering::Greater) != *negated,
                _ => false,
            }
        }
        Predicate::OnDate { column, .. } | Predicate::DateBetween { column, .. } if ty(column) != ColumnType::Timestamp => false,
        Predicate::OnDate { column, date } => date_of(&row.get(column)) == Some(*date),
        Predicate::DateBetween { column, from, to } => {
            matches!(date_of(&row.get(column)), Some(d) if d >= *from && d <= *to)
        }
        Predicate::Has { relation, predicate } => {
            let (target, rows) = related(data, row, relation);
            match target {
                Some(t) => rows.into_iter().any(|r| eval(data, t, r, predicate)),
                None => false,
            }
        }
        Predicate::WithinRadius { column, origin, radius_km } => row
            .get(column)
            .as_str()
            .and_then(GeoPoint::parse)
            .is_some_and(|p| origin.distance_km(&p) <= *radius_km),
        Predicate::Any(ps) => ps.iter().any(|p| eval(data, table, row, p)),
        Predicate::All(ps) => ps.iter().all(|p| eval(data, table, row, p)),
    }
}

fn sort_key(data: &Data, table: &'static Table, row: &Row, order: &Order) -> (ColumnType, Value) {
    match order.relation {
        None => (
            table.column_type(&order.column).unwrap_or(ColumnType::Text),
            row.get(&order.column),
        ),
        Some(rel) => {
            let (target, rows) = related(data, row, rel);
            let ty = target
                .and_then(|t| t.column_type(&order.column))
                .unwrap_or(ColumnType::Text);
            (ty, rows.first().map(|r| r.get(&order.column)).unwrap_or(Value::Null))
        }
    }
}

/// Nulls sort as the largest value, matching PostgreSQL's default.
fn cmp_keys(ty: ColumnType, a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(ty, a, b).unwrap_or(Ordering::Equal),
    }
}

fn sorted<'a>(data: &'a Data, query: &Query, mut rows: Vec<&'a Row>) -> Vec<&'a Row> {
    if query.order.is_empty() {
        return rows;
    }
    let mut keyed: Vec<(Vec<(ColumnType, Value)>, &Row)> = rows
        .drain(..)
        .map(|r| {
            let keys = query.order.iter().map(|o| sort_key(data, query.table, r, o)).collect();
            (keys, r)
        })
        .collect();
    keyed.sort_by(|(ka, _), (kb, _)| {
        for ((o, (ty, a)), (_, b)) in query.order.iter().zip(ka).zip(kb) {
            let ord = cmp_keys(*ty, a, b);
            let ord = match o.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    keyed.into_iter().map(|(_, r)| r).collect()
}

fn default_value(table: &'static Table, column: &str) -> Result<Value, StoreError> {
    let Some(col) = table.column(column) else {
        return Ok(Value::Null);
    };
    match col.default {
        None => Ok(Value::Null),
        Some(lit) => col.ty.coerce(&Value::String(lit.to_string())).ok_or_else(|| StoreError::InvalidValue {
            table: table.name,
            column: column.to_string(),
            value: Value::String(lit.to_string()),
        }),
    }
}

fn check_not_null(table: &'static Table, attributes: &Map<String, Value>) -> Result<(), StoreError> {
    for col in table.columns.iter().filter(|c| !c.nullable) {
        if attributes.get(col.name).map_or(true, Value::is_null) {
            return Err(StoreError::NotNull {
                table: table.name,
                column: col.name,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl Store for MemoryStore {
    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        check_query(query)?;
        let data = self.read()?;
        Ok(matching(&data, query).len() as u64)
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        check_query(query)?;
        let data = self.read()?;
        let rows = sorted(&data, query, matching(&data, query));
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn insert(&self, table: &'static Table, data: &Map<String, Value>) -> Result<Row, StoreError> {
        let values = prepare_write(table, data)?;
        let mut attributes = Map::new();
        for col in table.columns {
            let v = match values.get(col.name) {
                Some(v) => v.clone(),
                None => default_value(table, col.name)?,
            };
            attributes.insert(col.name.to_string(), v);
        }
        check_not_null(table, &attributes)?;
        let mut guard = self.write()?;
        let seq = guard.sequences.entry(table.name).or_insert(0);
        *seq += 1;
        let id = *seq;
        let now = Utc::now();
        let row = Row {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            attributes,
            relations: BTreeMap::new(),
        };
        guard.tables.entry(table.name).or_default().insert(id, row.clone());
        Ok(row)
    }

    async fn update(&self, table: &'static Table, id: i64, data: &Map<String, Value>) -> Result<Option<Row>, StoreError> {
        let values = prepare_write(table, data)?;
        let mut guard = self.write()?;
        let Some(row) = guard.tables.get_mut(table.name).and_then(|t| t.get_mut(&id)) else {
            return Ok(None);
        };
        let mut attributes = row.attributes.clone();
        for (k, v) in values {
            attributes.insert(k, v);
        }
        check_not_null(table, &attributes)?;
        row.attributes = attributes;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn soft_delete(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError> {
        if !table.soft_deletes {
            return Err(StoreError::Unsupported(format!("{} has no tombstone column", table.name)));
        }
        let mut guard = self.write()?;
        Ok(guard.tables.get_mut(table.name).and_then(|t| t.get_mut(&id)).map(|row| {
            let now = Utc::now();
            row.deleted_at = Some(now);
            row.updated_at = now;
            row.clone()
        }))
    }

    async fn restore(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError> {
        if !table.soft_deletes {
            return Err(StoreError::Unsupported(format!("{} has no tombstone column", table.name)));
        }
        let mut guard = self.write()?;
        Ok(guard.tables.get_mut(table.name).and_then(|t| t.get_mut(&id)).map(|row| {
            row.deleted_at = None;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn delete(&self, table: &'static Table, id: i64) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        Ok(guard
            .tables
            .get_mut(table.name)
            .and_then(|t| t.remove(&id))
            .is_some())
    }

    async fn delete_where(&self, query: &Query) -> Result<u64, StoreError> {
        check_query(query)?;
        let mut guard = self.write()?;
        let ids: Vec<i64> = matching(&guard, query).iter().map(|r| r.id).collect();
        if let Some(t) = guard.tables.get_mut(query.table.name) {
            for id in &ids {
                t.remove(id);
            }
        }
        Ok(ids.len() as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self
            .read()
            .map(|d| d.tables.iter().map(|(k, v)| format!("{}={}", k, v.len())).collect::<Vec<_>>().join(","))
            .unwrap_or_else(|_| "poisoned".into());
        write!(f, "MemoryStore({})", tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{FILES, NEWS, ROLES, SHOP, USERS};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn seeded() -> MemoryStore {
        let s = MemoryStore::new();
        s.insert(&ROLES, &obj(json!({"code": "admin", "name": "Administrator"}))).await.unwrap();
        s.insert(&ROLES, &obj(json!({"code": "user", "name": "User"}))).await.unwrap();
        s.insert(&USERS, &obj(json!({"phone": "0900", "name": "Alice", "role_id": 1}))).await.unwrap();
        s.insert(&USERS, &obj(json!({"phone": "0911", "name": "bob", "role_id": 2, "sns_driver": "google"}))).await.unwrap();
        s.insert(&USERS, &obj(json!({"phone": "0922", "name": null}))).await.unwrap();
        s
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_defaults() {
        let s = MemoryStore::new();
        let n = s
            .insert(&NEWS, &obj(json!({"title": "t", "created_by": "7"})))
            .await
            .unwrap();
        assert_eq!(n.id, 1);
        assert_eq!(n.get("is_published"), json!(false));
        assert_eq!(n.get("created_by"), json!(7));
        let f = s.insert(&FILES, &obj(json!({"url": "a.png"}))).await.unwrap();
        assert_eq!(f.get("type"), json!("image"));
    }

    #[tokio::test]
    async fn insert_enforces_not_null_and_known_columns() {
        let s = MemoryStore::new();
        let err = s.insert(&USERS, &obj(json!({"name": "x"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::NotNull { column: "phone", .. }));
        let err = s.insert(&USERS, &obj(json!({"phone": "1", "bogus": 1}))).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[tokio::test]
    async fn like_is_case_insensitive() {
        let s = seeded().await;
        let q = Query::new(&USERS).filter(Predicate::Like {
            column: "name".into(),
            needle: "ALI".into(),
            anchor: LikeAnchor::Start,
        });
        let rows = s.fetch(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_attr("name"), Some("Alice"));
    }

    #[tokio::test]
    async fn null_semantics_follow_sql() {
        let s = seeded().await;
        let q = Query::new(&USERS).filter(Predicate::not_eq("name", "Alice"));
        // the null-named user matches neither = nor <>
        assert_eq!(s.count(&q).await.unwrap(), 1);
        let q = Query::new(&USERS).filter(Predicate::is_null("name"));
        assert_eq!(s.count(&q).await.unwrap(), 1);
        let q = Query::new(&USERS).filter(Predicate::In {
            column: "sns_driver".into(),
            values: vec![json!("apple")],
            negated: true,
        });
        assert_eq!(s.count(&q).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn has_relation_filters_by_related_columns() {
        let s = seeded().await;
        let q = Query::new(&USERS).filter(Predicate::Has {
            relation: USERS.relation("role").unwrap(),
            predicate: Box::new(Predicate::eq("code", "admin")),
        });
        let rows = s.fetch(&q).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn morph_many_has_checks_owner_type() {
        let s = MemoryStore::new();
        s.insert(&USERS, &obj(json!({"phone": "1"}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": 1, "name": "A"}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": 1, "name": "B"}))).await.unwrap();
        s.insert(&FILES, &obj(json!({"url": "x", "fileable_id": 1, "fileable_type": "news"}))).await.unwrap();
        s.insert(&FILES, &obj(json!({"url": "y", "fileable_id": 2, "fileable_type": "shop"}))).await.unwrap();
        let q = Query::new(&SHOP).filter(Predicate::Has {
            relation: SHOP.relation("files").unwrap(),
            predicate: Box::new(Predicate::All(vec![])),
        });
        let rows = s.fetch(&q).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn ordering_puts_nulls_last_ascending() {
        let s = seeded().await;
        let q = Query::new(&USERS).order_by("name", Direction::Asc);
        let names: Vec<Value> = s.fetch(&q).await.unwrap().iter().map(|r| r.get("name")).collect();
        assert_eq!(names, vec![json!("Alice"), json!("bob"), Value::Null]);
        let q = Query::new(&USERS).order_by("id", Direction::Desc).window(1, 1);
        assert_eq!(s.fetch(&q).await.unwrap()[0].id, 2);
    }

    #[tokio::test]
    async fn ordering_through_belongs_to() {
        let s = seeded().await;
        let mut q = Query::new(&USERS).filter(Predicate::not_null("role_id"));
        q.order.push(Order {
            column: "code".into(),
            relation: USERS.relation("role"),
            direction: Direction::Desc,
        });
        let ids: Vec<i64> = s.fetch(&q).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn soft_delete_and_restore() {
        let s = seeded().await;
        s.soft_delete(&USERS, 1).await.unwrap().unwrap();
        assert_eq!(s.count(&Query::new(&USERS)).await.unwrap(), 2);
        assert_eq!(s.count(&Query::new(&USERS).trashed(Trashed::Only)).await.unwrap(), 1);
        assert_eq!(s.count(&Query::new(&USERS).trashed(Trashed::Include)).await.unwrap(), 3);
        let row = s.restore(&USERS, 1).await.unwrap().unwrap();
        assert!(!row.is_trashed());
        assert!(s.soft_delete(&ROLES, 1).await.is_err());
    }

    #[tokio::test]
    async fn radius_and_dates() {
        let s = MemoryStore::new();
        s.insert(&USERS, &obj(json!({"phone": "1"}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": 1, "geo": "21.0285,105.8542"}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": 1, "geo": "10.8231,106.6297"}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": 1, "geo": "garbage"}))).await.unwrap();
        let q = Query::new(&SHOP).filter(Predicate::WithinRadius {
            column: "geo".into(),
            origin: GeoPoint { lat: 21.0, lng: 105.8 },
            radius_km: 50.0,
        });
        assert_eq!(s.count(&q).await.unwrap(), 1);
        let today = Utc::now().date_naive();
        let q = Query::new(&SHOP).filter(Predicate::OnDate { column: "created_at".into(), date: today });
        assert_eq!(s.count(&q).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_where_removes_matches() {
        let s = MemoryStore::new();
        s.insert(&FILES, &obj(json!({"url": "a", "fileable_id": 1, "fileable_type": "news"}))).await.unwrap();
        s.insert(&FILES, &obj(json!({"url": "b", "fileable_id": 1, "fileable_type": "shop"}))).await.unwrap();
        let q = Query::new(&FILES)
            .filter(Predicate::eq("fileable_id", 1))
            .filter(Predicate::eq("fileable_type", "news"));
        assert_eq!(s.delete_where(&q).await.unwrap(), 1);
        assert_eq!(s.count(&Query::new(&FILES)).await.unwrap(), 1);
    }
}

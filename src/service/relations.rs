//! Eager loading: batch-load named (and dotted) relations onto fetched rows.

use crate::error::StoreError;
use crate::schema::{Loaded, OwnerType, Relation, RelationKind, Row, Table};
use crate::store::{Direction, Predicate, Query, Store};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// Group dotted paths by their first step: `["user.role", "files"]` → `{user: [role], files: []}`.
fn split_paths(paths: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut tree: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in paths {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path.as_str(), None),
        };
        let entry = tree.entry(head.to_string()).or_default();
        if let Some(r) = rest {
            entry.push(r.to_string());
        }
    }
    tree
}

fn distinct(values: impl Iterator<Item = i64>) -> Vec<Value> {
    let mut ids: Vec<i64> = values.collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter().map(Value::from).collect()
}

/// Load `paths` onto every row of `table`. Trashed related rows are never loaded.
pub fn load<'a>(store: &'a dyn Store, table: &'static Table, rows: &'a mut [Row], paths: &'a [String]) -> LoadFuture<'a> {
    Box::pin(async move {
        if rows.is_empty() || paths.is_empty() {
            return Ok(());
        }
        for (name, nested) in split_paths(paths) {
            let relation = table.relation(&name).ok_or_else(|| {
                StoreError::Unsupported(format!("{} has no relation {}", table.name, name))
            })?;
            load_relation(store, relation, rows, &nested).await?;
        }
        Ok(())
    })
}

async fn fetch_related(
    store: &dyn Store,
    target: &'static Table,
    query: Query,
    nested: &[String],
) -> Result<Vec<Row>, StoreError> {
    let mut related = store.fetch(&query.order_by("id", Direction::Asc)).await?;
    load(store, target, &mut related, nested).await?;
    Ok(related)
}

fn group_by(rows: Vec<Row>, column: &str) -> HashMap<i64, Vec<Row>> {
    let mut map: HashMap<i64, Vec<Row>> = HashMap::new();
    for r in rows {
        if let Some(key) = r.i64_attr(column) {
            map.entry(key).or_default().push(r);
        }
    }
    map
}

async fn load_relation(store: &dyn Store, relation: &'static Relation, rows: &mut [Row], nested: &[String]) -> Result<(), StoreError> {
    let name = relation.name.to_string();
    let missing_target = || StoreError::Unsupported(format!("relation {} has no target table", relation.name));
    match relation.kind {
        RelationKind::BelongsTo { foreign_key, .. } => {
            let target = relation.target().ok_or_else(missing_target)?;
            let ids = distinct(rows.iter().filter_map(|r| r.i64_attr(foreign_key)));
            let related = if ids.is_empty() {
                Vec::new()
            } else {
                fetch_related(store, target, Query::new(target).filter(Predicate::is_in("id", ids)), nested).await?
            };
            let by_id: HashMap<i64, Row> = related.into_iter().map(|r| (r.id, r)).collect();
            for row in rows.iter_mut() {
                let one = row.i64_attr(foreign_key).and_then(|id| by_id.get(&id)).cloned().map(Box::new);
                row.relations.insert(name.clone(), Loaded::One(one));
            }
        }
        RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => {
            let target = relation.target().ok_or_else(missing_target)?;
            let ids = distinct(rows.iter().map(|r| r.id));
            let query = Query::new(target).filter(Predicate::is_in(foreign_key, ids));
            let mut grouped = group_by(fetch_related(store, target, query, nested).await?, foreign_key);
            for row in rows.iter_mut() {
                let children = grouped.remove(&row.id).unwrap_or_default();
                let loaded = if relation.is_to_one() {
                    Loaded::One(children.into_iter().next().map(Box::new))
                } else {
                    Loaded::Many(children)
                };
                row.relations.insert(name.clone(), loaded);
            }
        }
        RelationKind::MorphMany { morph, owner, .. } => {
            let target = relation.target().ok_or_else(missing_target)?;
            let id_col = format!("{}_id", morph);
            let ids = distinct(rows.iter().map(|r| r.id));
            let query = Query::new(target)
                .filter(Predicate::eq(format!("{}_type", morph), owner.as_str()))
                .filter(Predicate::is_in(id_col.clone(), ids));
            let mut grouped = group_by(fetch_related(store, target, query, nested).await?, &id_col);
            for row in rows.iter_mut() {
                let children = grouped.remove(&row.id).unwrap_or_default();
                row.relations.insert(name.clone(), Loaded::Many(children));
            }
        }
        RelationKind::MorphTo { morph } => {
            let type_col = format!("{}_type", morph);
            let id_col = format!("{}_id", morph);
            let mut owners: HashMap<(OwnerType, i64), Row> = HashMap::new();
            for owner in OwnerType::ALL {
                let ids = distinct(rows.iter().filter_map(|r| {
                    let tag: OwnerType = r.str_attr(&type_col)?.parse().ok()?;
                    (tag == owner).then(|| r.i64_attr(&id_col)).flatten()
                }));
                if ids.is_empty() {
                    continue;
                }
                let target = owner.table();
                let query = Query::new(target).filter(Predicate::is_in("id", ids));
                for r in fetch_related(store, target, query, nested).await? {
                    owners.insert((owner, r.id), r);
                }
            }
            for row in rows.iter_mut() {
                let key = row
                    .str_attr(&type_col)
                    .and_then(|t| t.parse::<OwnerType>().ok())
                    .zip(row.i64_attr(&id_col));
                let one = key.and_then(|k| owners.get(&k)).cloned().map(Box::new);
                row.relations.insert(name.clone(), Loaded::One(one));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{FILES, NEWS, ROLES, SHOP, USERS};
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn paths(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn loads_belongs_to_and_nested_paths() {
        let s = MemoryStore::new();
        s.insert(&ROLES, &obj(json!({"code": "admin"}))).await.unwrap();
        let u = s.insert(&USERS, &obj(json!({"phone": "1", "role_id": 1}))).await.unwrap();
        s.insert(&SHOP, &obj(json!({"user_id": u.id, "name": "A"}))).await.unwrap();
        let mut rows = s.fetch(&Query::new(&SHOP)).await.unwrap();
        load(&s, &SHOP, &mut rows, &paths(&["user.role", "files"])).await.unwrap();
        let user = rows[0].related_one("user").unwrap();
        assert_eq!(user.related_one("role").unwrap().str_attr("code"), Some("admin"));
        assert_eq!(rows[0].relation("files"), Some(&Loaded::Many(vec![])));
    }

    #[tokio::test]
    async fn missing_belongs_to_loads_as_none() {
        let s = MemoryStore::new();
        s.insert(&USERS, &obj(json!({"phone": "1"}))).await.unwrap();
        let mut rows = s.fetch(&Query::new(&USERS)).await.unwrap();
        load(&s, &USERS, &mut rows, &paths(&["role"])).await.unwrap();
        assert_eq!(rows[0].relation("role"), Some(&Loaded::One(None)));
    }

    #[tokio::test]
    async fn trashed_related_rows_are_skipped() {
        let s = MemoryStore::new();
        let u = s.insert(&USERS, &obj(json!({"phone": "1"}))).await.unwrap();
        s.insert(&NEWS, &obj(json!({"created_by": u.id, "title": "t"}))).await.unwrap();
        s.soft_delete(&USERS, u.id).await.unwrap();
        let mut rows = s.fetch(&Query::new(&NEWS)).await.unwrap();
        load(&s, &NEWS, &mut rows, &paths(&["creator"])).await.unwrap();
        assert_eq!(rows[0].relation("creator"), Some(&Loaded::One(None)));
    }

    #[tokio::test]
    async fn morph_relations_resolve_by_owner_tag() {
        let s = MemoryStore::new();
        let u = s.insert(&USERS, &obj(json!({"phone": "1"}))).await.unwrap();
        let n = s.insert(&NEWS, &obj(json!({"created_by": u.id}))).await.unwrap();
        let shop = s.insert(&SHOP, &obj(json!({"user_id": u.id}))).await.unwrap();
        s.insert(&FILES, &obj(json!({"url": "a.png", "fileable_id": n.id, "fileable_type": "news"}))).await.unwrap();
        s.insert(&FILES, &obj(json!({"url": "b.png", "fileable_id": shop.id, "fileable_type": "shop"}))).await.unwrap();

        let mut news = s.fetch(&Query::new(&NEWS)).await.unwrap();
        load(&s, &NEWS, &mut news, &paths(&["files"])).await.unwrap();
        match news[0].relation("files") {
            Some(Loaded::Many(files)) => {
                assert_eq!(files.len(), 1);
                assert_eq!(files[0].str_attr("url"), Some("a.png"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut files = s.fetch(&Query::new(&FILES).order_by("id", Direction::Asc)).await.unwrap();
        load(&s, &FILES, &mut files, &paths(&["fileable"])).await.unwrap();
        assert_eq!(files[0].related_one("fileable").map(|r| r.id), Some(n.id));
        assert!(files[1].related_one("fileable").unwrap().attributes.contains_key("user_id"));
    }

    #[tokio::test]
    async fn unknown_relation_is_an_error() {
        let s = MemoryStore::new();
        s.insert(&ROLES, &obj(json!({"code": "x"}))).await.unwrap();
        let mut rows = s.fetch(&Query::new(&ROLES)).await.unwrap();
        assert!(load(&s, &ROLES, &mut rows, &paths(&["nothing"])).await.is_err());
    }
}

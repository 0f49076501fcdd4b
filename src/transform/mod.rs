//! Response shaping: base fields, per-resource attributes and loaded relations.

use crate::schema::{format_timestamp, Loaded, OwnerType, Row, RelationKind, Table};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Settings a transformer may consult.
#[derive(Clone, Debug, Default)]
pub struct TransformContext {
    /// Prefix for relative file paths; no trailing slash.
    pub app_url: String,
}

/// Absolute URL for a stored file path. Paths already starting with `http` pass through.
pub fn file_url(app_url: &str, path: Option<&str>) -> Value {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        None => Value::Null,
        Some(p) if p.starts_with("http") || app_url.is_empty() => Value::String(p.to_string()),
        Some(p) => Value::String(format!("{}/{}", app_url, p.trim_start_matches('/'))),
    }
}

/// Entity attributes of one resource. Base fields and relations are added by [`Transformers`].
pub trait Transform: Send + Sync {
    fn attributes(&self, row: &Row, ctx: &TransformContext, out: &mut Map<String, Value>);
}

/// Emits the listed columns, in order, as stored.
#[derive(Clone, Debug)]
pub struct Columns(pub Vec<&'static str>);

impl Columns {
    /// Every declared column of `table` except `hidden`.
    pub fn visible(table: &'static Table, hidden: &HashSet<String>) -> Self {
        Columns(
            table
                .columns
                .iter()
                .map(|c| c.name)
                .filter(|c| !hidden.contains(*c))
                .collect(),
        )
    }
}

impl Transform for Columns {
    fn attributes(&self, row: &Row, _ctx: &TransformContext, out: &mut Map<String, Value>) {
        for c in &self.0 {
            out.insert((*c).to_string(), row.get(c));
        }
    }
}

/// Transformers by table name; tables without one get every non-secret column.
#[derive(Clone, Default)]
pub struct Transformers {
    by_table: HashMap<&'static str, Arc<dyn Transform>>,
    ctx: TransformContext,
}

impl std::fmt::Debug for Transformers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformers")
            .field("tables", &self.by_table.keys().collect::<Vec<_>>())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Columns never emitted by the fallback transformer.
const SECRET_COLUMNS: &[&str] = &["password", "token"];

impl Transformers {
    pub fn new(ctx: TransformContext) -> Self {
        Transformers {
            by_table: HashMap::new(),
            ctx,
        }
    }

    pub fn register(&mut self, table: &'static Table, t: Arc<dyn Transform>) {
        self.by_table.insert(table.name, t);
    }

    pub fn context(&self) -> &TransformContext {
        &self.ctx
    }

    /// JSON for one row: `id`, `created_at`, `updated_at`, attributes, then each loaded relation.
    pub fn row(&self, table: &'static Table, row: &Row) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::from(row.id));
        out.insert("created_at".into(), Value::String(format_timestamp(&row.created_at)));
        out.insert("updated_at".into(), Value::String(format_timestamp(&row.updated_at)));
        match self.by_table.get(table.name) {
            Some(t) => t.attributes(row, &self.ctx, &mut out),
            None => {
                for c in table.columns.iter().filter(|c| !SECRET_COLUMNS.contains(&c.name)) {
                    out.insert(c.name.to_string(), row.get(c.name));
                }
            }
        }
        for (name, loaded) in &row.relations {
            let Some(relation) = table.relation(name) else {
                continue;
            };
            let value = match loaded {
                Loaded::One(None) => Value::Null,
                Loaded::One(Some(related)) => {
                    let target = match relation.kind {
                        RelationKind::MorphTo { morph } => row
                            .str_attr(&format!("{}_type", morph))
                            .and_then(|t| t.parse::<OwnerType>().ok())
                            .map(OwnerType::table),
                        _ => relation.target(),
                    };
                    match target {
                        Some(t) => self.row(t, related),
                        None => Value::Null,
                    }
                }
                Loaded::Many(items) => match relation.target() {
                    Some(t) => Value::Array(items.iter().map(|r| self.row(t, r)).collect()),
                    None => Value::Array(Vec::new()),
                },
            };
            out.insert(name.clone(), value);
        }
        Value::Object(out)
    }

    pub fn rows(&self, table: &'static Table, rows: &[Row]) -> Vec<Value> {
        rows.iter().map(|r| self.row(table, r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{ROLES, USERS};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(id: i64, attrs: Value) -> Row {
        let now = Utc::now();
        Row {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            attributes: attrs.as_object().cloned().unwrap(),
            relations: BTreeMap::new(),
        }
    }

    #[test]
    fn relation_omitted_unless_loaded() {
        let t = Transformers::default();
        let user = row(1, json!({"phone": "1", "role_id": 2, "password": "secret"}));
        let v = t.row(&USERS, &user);
        assert!(v.get("role").is_none());
        assert!(v.get("password").is_none());
        assert_eq!(v["phone"], "1");

        let mut loaded = user.clone();
        loaded.relations.insert("role".into(), Loaded::One(None));
        loaded.relations.insert("news".into(), Loaded::Many(vec![]));
        let v = t.row(&USERS, &loaded);
        assert_eq!(v["role"], Value::Null);
        assert_eq!(v["news"], json!([]));
    }

    #[test]
    fn nested_rows_use_their_own_transformer() {
        let mut t = Transformers::default();
        t.register(&ROLES, Arc::new(Columns(vec!["code"])));
        let mut user = row(1, json!({"phone": "1"}));
        user.relations
            .insert("role".into(), Loaded::One(Some(Box::new(row(2, json!({"code": "admin", "name": "Admin"}))))));
        let v = t.row(&USERS, &user);
        assert_eq!(v["role"]["code"], "admin");
        assert!(v["role"].get("name").is_none());
        assert!(v["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn file_urls_are_prefixed() {
        assert_eq!(file_url("https://app.test", Some("uploads/a.png")), json!("https://app.test/uploads/a.png"));
        assert_eq!(file_url("https://app.test", Some("/a.png")), json!("https://app.test/a.png"));
        assert_eq!(file_url("https://app.test", Some("https://cdn/x.png")), json!("https://cdn/x.png"));
        assert_eq!(file_url("https://app.test", None), Value::Null);
        assert_eq!(file_url("", Some("a.png")), json!("a.png"));
    }

    #[test]
    fn visible_columns_skip_hidden() {
        let hidden: HashSet<String> = ["password".to_string()].into_iter().collect();
        let c = Columns::visible(&USERS, &hidden);
        assert!(!c.0.contains(&"password"));
        assert!(c.0.contains(&"phone"));
    }
}

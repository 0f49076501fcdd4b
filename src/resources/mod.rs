//! Concrete resources: hooks and transformers bound to the resolved config.

pub mod attachments;
pub mod files;
pub mod news;
pub mod shops;
pub mod users;

use crate::config::{ResolvedModel, ResolvedResource};
use crate::query::QueryParams;
use crate::schema::tables;
use crate::service::{NoHooks, ResourceHooks};
use crate::store::Predicate;
use crate::transform::{Columns, TransformContext, Transformers};
use std::collections::HashMap;
use std::sync::Arc;

/// Equality filter on an integer column. A value that is not an integer matches no rows.
pub(crate) fn int_filter(params: &QueryParams, key: &str) -> Option<Predicate> {
    let raw = params.filled(key)?;
    match raw.parse::<i64>() {
        Ok(id) => Some(Predicate::eq(key, id)),
        Err(_) => {
            tracing::debug!(param = %key, value = %raw, "non-integer filter matches nothing");
            Some(Predicate::is_in(key, Vec::new()))
        }
    }
}

/// A resolved resource with its behavior.
#[derive(Clone)]
pub struct Resource {
    pub config: ResolvedResource,
    pub hooks: Arc<dyn ResourceHooks>,
}

fn hooks_for(table: &str) -> Arc<dyn ResourceHooks> {
    match table {
        "users" => Arc::new(users::UserHooks),
        "shop" => Arc::new(shops::ShopHooks),
        "news" => Arc::new(news::NewsHooks),
        "files" => Arc::new(files::FileHooks),
        _ => Arc::new(NoHooks),
    }
}

/// Resources by path segment plus the transformers used to render their rows.
#[derive(Clone)]
pub struct Registry {
    resources: HashMap<String, Resource>,
    transformers: Transformers,
}

impl Registry {
    pub fn build(model: ResolvedModel, ctx: TransformContext) -> Self {
        let mut transformers = Transformers::new(ctx);
        transformers.register(&tables::FILES, Arc::new(files::FileTransform));
        let mut resources = HashMap::new();
        for config in model.resources {
            let table = config.table;
            if table.name != tables::FILES.name {
                transformers.register(table, Arc::new(Columns::visible(table, &config.hidden)));
            }
            let hooks = hooks_for(table.name);
            tracing::debug!(path = %config.path_segment, table = %table.name, "registered resource");
            resources.insert(config.path_segment.clone(), Resource { config, hooks });
        }
        Registry {
            resources,
            transformers,
        }
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.resources.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn transformers(&self) -> &Transformers {
        &self.transformers
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_resources, resolve};
    use crate::schema::Row;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::build(resolve(&load_resources(None).unwrap()).unwrap(), TransformContext::default())
    }

    #[test]
    fn every_builtin_resource_is_registered() {
        let r = registry();
        let mut paths: Vec<&str> = r.paths().collect();
        paths.sort();
        assert_eq!(paths, ["files", "news", "roles", "shops", "users"]);
    }

    #[test]
    fn user_rows_never_show_password() {
        let r = registry();
        let row = Row::from_json(json!({"id": 1, "phone": "1", "password": "$argon2id$x"}).as_object().cloned().unwrap()).unwrap();
        let v = r.transformers().row(&tables::USERS, &row);
        assert!(v.get("password").is_none());
        assert_eq!(v["phone"], "1");
    }

    #[tokio::test]
    async fn int_filter_words_match_nothing() {
        use crate::store::{MemoryStore, Query, Store};
        let s = MemoryStore::new();
        s.insert(&tables::SHOP, json!({"user_id": 1, "name": "A"}).as_object().unwrap()).await.unwrap();
        let p = QueryParams::from_pairs([("user_id", "abc"), ("x", " ")]);
        assert!(int_filter(&p, "x").is_none());

        let word = int_filter(&p, "user_id").unwrap();
        assert!(matches!(&word, Predicate::In { values, negated: false, .. } if values.is_empty()));
        assert_eq!(s.count(&Query::new(&tables::SHOP).filter(word)).await.unwrap(), 0);

        let p = QueryParams::from_pairs([("user_id", "1")]);
        let id = int_filter(&p, "user_id").unwrap();
        assert_eq!(s.count(&Query::new(&tables::SHOP).filter(id)).await.unwrap(), 1);
    }
}

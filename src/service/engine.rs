//! Generic resource pipeline: search, filter, sort, paginate, persist, eager-load.

use super::hooks::{HookContext, ResourceHooks};
use super::relations;
use super::validation::{Mode, RequestValidator};
use crate::auth::Caller;
use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::query::{search, sort, Page, PageRequest, QueryParams};
use crate::schema::{Row, Table};
use crate::store::{Query, Store, Trashed};
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// One request's view of a resource. Holds no state across requests.
pub struct ResourceEngine<'a> {
    resource: &'a ResolvedResource,
    hooks: &'a dyn ResourceHooks,
    store: &'a dyn Store,
    caller: Option<&'a Caller>,
}

/// Request input restricted to fillable columns. An explicit null on a non-nullable column
/// with a default is dropped so the default applies.
pub fn fillable(table: &'static Table, data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .filter(|(k, _)| table.is_fillable(k))
        .filter(|(k, v)| {
            !(v.is_null()
                && table
                    .column(k)
                    .is_some_and(|c| !c.nullable && c.default.is_some()))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// `trashed=with|only`, honoured on soft-delete tables only.
fn trashed_mode(table: &Table, params: &QueryParams) -> Trashed {
    if !table.soft_deletes {
        return Trashed::Exclude;
    }
    match params.filled("trashed") {
        Some("with") => Trashed::Include,
        Some("only") => Trashed::Only,
        _ => Trashed::Exclude,
    }
}

impl<'a> ResourceEngine<'a> {
    pub fn new(
        resource: &'a ResolvedResource,
        hooks: &'a dyn ResourceHooks,
        store: &'a dyn Store,
        caller: Option<&'a Caller>,
    ) -> Self {
        ResourceEngine {
            resource,
            hooks,
            store,
            caller,
        }
    }

    fn table(&self) -> &'static Table {
        self.resource.table
    }

    fn ctx(&self) -> HookContext<'_> {
        HookContext {
            store: self.store,
            caller: self.caller,
        }
    }

    fn not_found(&self, id: i64) -> AppError {
        AppError::model_not_found(self.table().model, id)
    }

    async fn load(&self, rows: &mut [Row]) -> Result<(), AppError> {
        relations::load(self.store, self.table(), rows, &self.resource.with).await?;
        Ok(())
    }

    async fn load_one(&self, row: Row) -> Result<Row, AppError> {
        let mut rows = [row];
        self.load(&mut rows).await?;
        let [row] = rows;
        Ok(row)
    }

    async fn find(&self, id: i64, trashed: Trashed) -> Result<Row, AppError> {
        self.store
            .find(self.table(), id, trashed)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    /// Listing query without window: search, resource filters, trashed mode and ordering.
    pub fn build_query(&self, params: &QueryParams, today: NaiveDate) -> Result<Query, AppError> {
        let table = self.table();
        let mut query = Query::new(table).trashed(trashed_mode(table, params));
        if let Some(p) = search::compile(table, self.resource.searchable_fields(), params.get("search"), today) {
            query.push(p);
        }
        self.hooks.apply_filters(&mut query, params, today)?;
        query.order = sort::compile(
            &self.resource.sortable,
            params.single("sort_by"),
            params.single("sort_direction"),
        );
        Ok(query)
    }

    pub async fn list(&self, params: &QueryParams, today: NaiveDate) -> Result<Page<Row>, AppError> {
        let req = PageRequest::from_params(params.single("per_page"), params.single("page"), self.resource.per_page);
        let query = self.build_query(params, today)?;
        let total = self.store.count(&query).await?;
        let mut rows = self.store.fetch(&query.window(req.limit(), req.offset())).await?;
        self.load(&mut rows).await?;
        tracing::debug!(resource = %self.resource.path_segment, total, page = req.page, "listed");
        Ok(Page::new(rows, total, req))
    }

    pub async fn create(&self, input: &Map<String, Value>) -> Result<Row, AppError> {
        let validated = RequestValidator::new(self.store)
            .validate(&self.resource.create_rules, input, Mode::Full, None)
            .await?;
        let ctx = self.ctx();
        let data = self.hooks.before_create(&ctx, validated).await?;
        let row = self.store.insert(self.table(), &fillable(self.table(), &data)).await?;
        self.hooks.after_create(&ctx, &row, &data).await?;
        tracing::info!(resource = %self.resource.path_segment, id = row.id, "created");
        self.load_one(row).await
    }

    pub async fn read(&self, id: i64) -> Result<Row, AppError> {
        let row = self.find(id, Trashed::Exclude).await?;
        self.load_one(row).await
    }

    /// `Mode::Full` for PUT, `Mode::Partial` for PATCH.
    pub async fn update(&self, id: i64, input: &Map<String, Value>, mode: Mode) -> Result<Row, AppError> {
        let table = self.table();
        let existing = self.find(id, Trashed::Exclude).await?;
        let validated = RequestValidator::new(self.store)
            .validate(&self.resource.update_rules, input, mode, Some((table, id)))
            .await?;
        let ctx = self.ctx();
        let data = self.hooks.before_update(&ctx, &existing, validated).await?;
        let values = fillable(table, &data);
        let row = if values.is_empty() {
            existing
        } else {
            self.store.update(table, id, &values).await?.ok_or_else(|| self.not_found(id))?
        };
        self.hooks.after_update(&ctx, &row, &data).await?;
        tracing::info!(resource = %self.resource.path_segment, id, "updated");
        self.read(id).await
    }

    /// Soft delete when the table supports it, else permanent. Returns the acknowledgment message.
    pub async fn delete(&self, id: i64) -> Result<String, AppError> {
        let table = self.table();
        let row = self.find(id, Trashed::Exclude).await?;
        let ctx = self.ctx();
        self.hooks.before_delete(&ctx, &row).await?;
        if table.soft_deletes {
            self.store.soft_delete(table, id).await?;
        } else {
            self.store.delete(table, id).await?;
        }
        self.hooks.after_delete(&ctx, &row).await?;
        tracing::info!(resource = %self.resource.path_segment, id, soft = table.soft_deletes, "deleted");
        Ok(format!("{} deleted successfully", self.resource.label))
    }

    fn require_soft_deletes(&self) -> Result<(), AppError> {
        if self.table().soft_deletes {
            Ok(())
        } else {
            Err(AppError::Unsupported("Model does not support soft deletes".into()))
        }
    }

    pub async fn restore(&self, id: i64) -> Result<Row, AppError> {
        self.require_soft_deletes()?;
        self.find(id, Trashed::Include).await?;
        let row = self
            .store
            .restore(self.table(), id)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        tracing::info!(resource = %self.resource.path_segment, id, "restored");
        Ok(row)
    }

    pub async fn force_delete(&self, id: i64) -> Result<String, AppError> {
        self.require_soft_deletes()?;
        self.find(id, Trashed::Include).await?;
        self.store.delete(self.table(), id).await?;
        tracing::info!(resource = %self.resource.path_segment, id, "force deleted");
        Ok(format!("{} permanently deleted", self.resource.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_resources, resolve, ResolvedModel};
    use crate::schema::tables::{NEWS, ROLES, USERS};
    use crate::service::hooks::NoHooks;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&load_resources(None).unwrap()).unwrap()
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        chrono::Utc::now().date_naive()
    }

    async fn seeded() -> MemoryStore {
        let s = MemoryStore::new();
        s.insert(&ROLES, &obj(json!({"code": "admin"}))).await.unwrap();
        s.insert(&ROLES, &obj(json!({"code": "user"}))).await.unwrap();
        for i in 0..30 {
            s.insert(&USERS, &obj(json!({"phone": format!("09{:02}", i), "role_id": 1 + i % 2, "name": format!("u{}", i)})))
                .await
                .unwrap();
        }
        s
    }

    #[tokio::test]
    async fn list_paginates_and_clamps() {
        let m = model();
        let users = m.resource_by_path("users").unwrap();
        let s = seeded().await;
        let e = ResourceEngine::new(users, &NoHooks, &s, None);
        let page = e.list(&QueryParams::from_pairs([("per_page", "500")]), today()).await.unwrap();
        assert_eq!(page.items.len(), 30);
        assert_eq!(page.meta.per_page, 100);
        let page = e.list(&QueryParams::from_pairs([("per_page", "0"), ("page", "2")]), today()).await.unwrap();
        assert_eq!(page.meta.per_page, 15);
        assert_eq!(page.items.len(), 15);
        assert_eq!(page.meta.last_page, 2);
        // default order id desc; users eager-load role
        let first = e.list(&QueryParams::default(), today()).await.unwrap().items.remove(0);
        assert_eq!(first.id, 30);
        assert!(first.relation("role").is_some());
    }

    #[tokio::test]
    async fn list_searches_and_sorts() {
        let m = model();
        let users = m.resource_by_path("users").unwrap();
        let s = seeded().await;
        let e = ResourceEngine::new(users, &NoHooks, &s, None);
        let params = QueryParams::from_pairs([("search", "0901"), ("sort_by", "phone"), ("sort_direction", "asc")]);
        let page = e.list(&params, today()).await.unwrap();
        assert_eq!(page.meta.total, 1);
        let params = QueryParams::from_pairs([("sort_by", "phone"), ("sort_direction", "asc")]);
        let page = e.list(&params, today()).await.unwrap();
        assert_eq!(page.items[0].str_attr("phone"), Some("0900"));
    }

    #[tokio::test]
    async fn create_keeps_fillable_only() {
        let m = model();
        let roles = m.resource_by_path("roles").unwrap();
        let s = MemoryStore::new();
        let e = ResourceEngine::new(roles, &NoHooks, &s, None);
        let row = e.create(&obj(json!({"code": " editor ", "name": "", "id": 77}))).await.unwrap();
        assert_eq!(row.str_attr("code"), Some("editor"));
        assert_ne!(row.id, 77);
        let dup = e.create(&obj(json!({"code": "editor"}))).await.unwrap_err();
        assert!(matches!(dup, AppError::Validation(ref f) if f.has("code")));
    }

    #[tokio::test]
    async fn update_full_and_partial() {
        let m = model();
        let roles = m.resource_by_path("roles").unwrap();
        let s = MemoryStore::new();
        let e = ResourceEngine::new(roles, &NoHooks, &s, None);
        let row = e.create(&obj(json!({"code": "a", "name": "A"}))).await.unwrap();
        // unique ignores the row itself
        let same = e.update(row.id, &obj(json!({"code": "a", "name": "B"})), Mode::Full).await.unwrap();
        assert_eq!(same.str_attr("name"), Some("B"));
        let patched = e.update(row.id, &obj(json!({"name": "C"})), Mode::Partial).await.unwrap();
        assert_eq!(patched.str_attr("code"), Some("a"));
        assert!(e.update(row.id, &obj(json!({"name": "C"})), Mode::Full).await.is_err());
        assert!(matches!(e.update(999, &obj(json!({})), Mode::Partial).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn destroy_restore_force_delete_cycle() {
        let m = model();
        let users = m.resource_by_path("users").unwrap();
        let s = seeded().await;
        let e = ResourceEngine::new(users, &NoHooks, &s, None);
        assert_eq!(e.delete(1).await.unwrap(), "User deleted successfully");
        assert!(matches!(e.read(1).await, Err(AppError::NotFound(_))));
        let only = e.list(&QueryParams::from_pairs([("trashed", "only")]), today()).await.unwrap();
        assert_eq!(only.meta.total, 1);
        let restored = e.restore(1).await.unwrap();
        assert!(!restored.is_trashed());
        e.delete(1).await.unwrap();
        assert_eq!(e.force_delete(1).await.unwrap(), "User permanently deleted");
        assert!(matches!(e.restore(1).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn hard_delete_tables_reject_restore_before_lookup() {
        let m = model();
        let roles = m.resource_by_path("roles").unwrap();
        let s = MemoryStore::new();
        let e = ResourceEngine::new(roles, &NoHooks, &s, None);
        assert!(matches!(e.restore(12345).await, Err(AppError::Unsupported(ref m)) if m == "Model does not support soft deletes"));
        assert!(matches!(e.force_delete(12345).await, Err(AppError::Unsupported(_))));
        let row = e.create(&obj(json!({"code": "x"}))).await.unwrap();
        assert_eq!(e.delete(row.id).await.unwrap(), "Role deleted successfully");
        assert!(s.find(&ROLES, row.id, Trashed::Include).await.unwrap().is_none());
    }

    #[test]
    fn fillable_drops_null_on_defaulted_columns() {
        let data = obj(json!({"title": null, "is_published": null, "id": 3}));
        let out = fillable(&NEWS, &data);
        assert!(out.contains_key("title"));
        assert!(!out.contains_key("is_published"));
        assert!(!out.contains_key("id"));
    }
}

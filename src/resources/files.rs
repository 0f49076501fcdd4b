//! Files: owner existence check and absolute URLs in responses.

use crate::error::AppError;
use crate::schema::{OwnerType, Row};
use crate::service::{HookContext, ResourceHooks};
use crate::store::{Store, Trashed};
use crate::transform::{file_url, Transform, TransformContext};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Default)]
pub struct FileHooks;

/// Fails with 422 on `fileable_id` unless the tagged owner exists (trashed owners do not count).
async fn check_owner(store: &dyn Store, owner_type: Option<&str>, owner_id: Option<i64>) -> Result<(), AppError> {
    let invalid = || AppError::validation("fileable_id", "The selected owner is invalid.");
    let owner: OwnerType = owner_type
        .ok_or_else(invalid)?
        .parse()
        .map_err(|_| AppError::validation("fileable_type", "The selected owner type is invalid."))?;
    let id = owner_id.ok_or_else(invalid)?;
    match store.find(owner.table(), id, Trashed::Exclude).await? {
        Some(_) => Ok(()),
        None => Err(invalid()),
    }
}

#[async_trait]
impl ResourceHooks for FileHooks {
    async fn before_create(&self, ctx: &HookContext<'_>, data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        check_owner(
            ctx.store,
            data.get("fileable_type").and_then(Value::as_str),
            data.get("fileable_id").and_then(Value::as_i64),
        )
        .await?;
        Ok(data)
    }

    async fn before_update(
        &self,
        ctx: &HookContext<'_>,
        existing: &Row,
        data: Map<String, Value>,
    ) -> Result<Map<String, Value>, AppError> {
        if data.contains_key("fileable_type") || data.contains_key("fileable_id") {
            let owner_type = data
                .get("fileable_type")
                .and_then(Value::as_str)
                .or_else(|| existing.str_attr("fileable_type"));
            let owner_id = data
                .get("fileable_id")
                .and_then(Value::as_i64)
                .or_else(|| existing.i64_attr("fileable_id"));
            check_owner(ctx.store, owner_type, owner_id).await?;
        }
        Ok(data)
    }
}

/// File attributes with `url` / `thumb` made absolute.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileTransform;

impl Transform for FileTransform {
    fn attributes(&self, row: &Row, ctx: &TransformContext, out: &mut Map<String, Value>) {
        out.insert("url".into(), file_url(&ctx.app_url, row.str_attr("url")));
        out.insert("thumb".into(), file_url(&ctx.app_url, row.str_attr("thumb")));
        for c in ["type", "fileable_id", "fileable_type"] {
            out.insert(c.into(), row.get(c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{NEWS, USERS};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn owner_must_exist() {
        let s = MemoryStore::new();
        let u = s.insert(&USERS, json!({"phone": "1"}).as_object().unwrap()).await.unwrap();
        let n = s.insert(&NEWS, json!({"created_by": u.id}).as_object().unwrap()).await.unwrap();
        assert!(check_owner(&s, Some("news"), Some(n.id)).await.is_ok());
        let e = check_owner(&s, Some("shop"), Some(n.id)).await.unwrap_err();
        assert!(matches!(e, AppError::Validation(ref f) if f.has("fileable_id")));
        let e = check_owner(&s, Some("job"), Some(1)).await.unwrap_err();
        assert!(matches!(e, AppError::Validation(ref f) if f.has("fileable_type")));
    }

    #[test]
    fn urls_become_absolute() {
        let row = Row::from_json(
            json!({"id": 1, "url": "uploads/a.png", "thumb": null, "type": "image", "fileable_id": 2, "fileable_type": "shop"})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        let mut out = Map::new();
        FileTransform.attributes(&row, &TransformContext { app_url: "https://x.test".into() }, &mut out);
        assert_eq!(out["url"], "https://x.test/uploads/a.png");
        assert_eq!(out["thumb"], Value::Null);
        assert_eq!(out["fileable_type"], "shop");
    }
}

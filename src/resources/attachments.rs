//! File rows attached to an owner through the `fileable` morph pair.

use crate::error::{AppError, FieldErrors, StoreError};
use crate::schema::tables::FILES;
use crate::schema::OwnerType;
use crate::store::{Predicate, Query, Store};
use serde_json::{Map, Value};

pub const FILE_TYPES: &[&str] = &["image", "video", "document"];

/// One entry of a `files` input array: `{"url": ..., "thumb"?: ..., "type"?: ...}` or a bare URL string.
fn entry(value: &Value) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    match value {
        Value::String(url) => {
            out.insert("url".into(), Value::String(url.clone()));
        }
        Value::Object(m) => {
            for key in ["url", "thumb", "type"] {
                match m.get(key) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(s)) => {
                        out.insert(key.into(), Value::String(s.clone()));
                    }
                    Some(_) => return None,
                }
            }
        }
        _ => return None,
    }
    Some(out)
}

/// Check the shape of `data["files"]` before anything is persisted.
pub fn validate(data: &Map<String, Value>) -> Result<(), AppError> {
    let Some(Value::Array(items)) = data.get("files") else {
        return Ok(());
    };
    let mut errors = FieldErrors::new();
    for (i, item) in items.iter().enumerate() {
        match entry(item) {
            None => errors.add(format!("files.{}", i), format!("The files.{} field must be a file object.", i)),
            Some(e) => {
                if !e.contains_key("url") {
                    errors.add(format!("files.{}.url", i), format!("The files.{}.url field is required.", i));
                }
                if let Some(t) = e.get("type").and_then(Value::as_str) {
                    if !FILE_TYPES.contains(&t) {
                        errors.add(format!("files.{}.type", i), format!("The selected files.{}.type is invalid.", i));
                    }
                }
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Insert one file row per entry of `data["files"]`, owned by `(owner, owner_id)`.
pub async fn attach(store: &dyn Store, owner: OwnerType, owner_id: i64, data: &Map<String, Value>) -> Result<usize, StoreError> {
    let Some(Value::Array(items)) = data.get("files") else {
        return Ok(0);
    };
    let mut n = 0;
    for mut row in items.iter().filter_map(entry) {
        row.insert("fileable_id".into(), Value::from(owner_id));
        row.insert("fileable_type".into(), Value::String(owner.as_str().into()));
        store.insert(&FILES, &row).await?;
        n += 1;
    }
    tracing::debug!(owner = owner.as_str(), owner_id, files = n, "attached files");
    Ok(n)
}

pub async fn detach_all(store: &dyn Store, owner: OwnerType, owner_id: i64) -> Result<u64, StoreError> {
    let q = Query::new(&FILES)
        .filter(Predicate::eq("fileable_type", owner.as_str()))
        .filter(Predicate::eq("fileable_id", owner_id));
    store.delete_where(&q).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn validates_entries() {
        assert!(validate(&obj(json!({}))).is_ok());
        assert!(validate(&obj(json!({"files": ["a.png", {"url": "b.png", "type": "video"}]}))).is_ok());
        let err = validate(&obj(json!({"files": [{"thumb": "t.png"}, 5, {"url": "x", "type": "gif"}]}))).unwrap_err();
        match err {
            AppError::Validation(f) => {
                assert!(f.has("files.0.url"));
                assert!(f.has("files.1"));
                assert!(f.has("files.2.type"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn attach_and_detach() {
        let s = MemoryStore::new();
        let data = obj(json!({"files": ["a.png", {"url": "b.mp4", "type": "video"}]}));
        assert_eq!(attach(&s, OwnerType::News, 4, &data).await.unwrap(), 2);
        attach(&s, OwnerType::Shop, 4, &obj(json!({"files": ["c.png"]}))).await.unwrap();
        let files = s.fetch(&Query::new(&FILES)).await.unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().any(|f| f.str_attr("type") == Some("image")));
        assert_eq!(detach_all(&s, OwnerType::News, 4).await.unwrap(), 2);
        assert_eq!(s.count(&Query::new(&FILES)).await.unwrap(), 1);
    }
}

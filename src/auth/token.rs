//! Personal access tokens: `"<id>|<secret>"` handed to clients, SHA-256 hex of the secret stored.

use crate::error::StoreError;
use crate::schema::tables::PERSONAL_ACCESS_TOKENS;
use crate::schema::Row;
use crate::store::{Predicate, Query, Store, Trashed};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub const SECRET_LEN: usize = 40;
pub const DEFAULT_TOKEN_NAME: &str = "auth-token";

pub fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Split `"<id>|<secret>"`. A bare secret has no id.
pub fn split(plain: &str) -> (Option<i64>, &str) {
    match plain.split_once('|') {
        Some((id, secret)) => (id.parse().ok(), secret),
        None => (None, plain),
    }
}

/// Store a new token for `user_id`; returns the plain text value for the client.
pub async fn issue(store: &dyn Store, user_id: i64, name: &str) -> Result<(Row, String), StoreError> {
    let secret = random_secret();
    let data: Map<String, Value> = json!({
        "user_id": user_id,
        "name": name,
        "token": digest(&secret),
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    let row = store.insert(&PERSONAL_ACCESS_TOKENS, &data).await?;
    let plain = format!("{}|{}", row.id, secret);
    Ok((row, plain))
}

/// Token row matching a presented bearer value.
pub async fn find(store: &dyn Store, plain: &str) -> Result<Option<Row>, StoreError> {
    let (id, secret) = split(plain.trim());
    if secret.is_empty() {
        return Ok(None);
    }
    let hashed = digest(secret);
    let row = match id {
        Some(id) => store.find(&PERSONAL_ACCESS_TOKENS, id, Trashed::Exclude).await?,
        None => {
            store
                .first(Query::new(&PERSONAL_ACCESS_TOKENS).filter(Predicate::eq("token", hashed.clone())))
                .await?
        }
    };
    Ok(row.filter(|r| r.str_attr("token") == Some(hashed.as_str())))
}

pub async fn touch(store: &dyn Store, token_id: i64) -> Result<(), StoreError> {
    let data: Map<String, Value> = json!({ "last_used_at": crate::schema::format_timestamp(&chrono::Utc::now()) })
        .as_object()
        .cloned()
        .unwrap_or_default();
    store.update(&PERSONAL_ACCESS_TOKENS, token_id, &data).await?;
    Ok(())
}

pub async fn revoke(store: &dyn Store, token_id: i64) -> Result<bool, StoreError> {
    store.delete(&PERSONAL_ACCESS_TOKENS, token_id).await
}

/// Delete every token of `user_id`, optionally keeping one.
pub async fn revoke_all(store: &dyn Store, user_id: i64, keep: Option<i64>) -> Result<u64, StoreError> {
    let mut q = Query::new(&PERSONAL_ACCESS_TOKENS).filter(Predicate::eq("user_id", user_id));
    if let Some(id) = keep {
        q.push(Predicate::not_eq("id", id));
    }
    store.delete_where(&q).await
}

pub async fn list_for_user(store: &dyn Store, user_id: i64) -> Result<Vec<Row>, StoreError> {
    let q = Query::new(&PERSONAL_ACCESS_TOKENS)
        .filter(Predicate::eq("user_id", user_id))
        .order_by("id", crate::store::Direction::Desc);
    store.fetch(&q).await
}

//! Default data: the `admin` and `user` roles and an optional admin account. Safe to rerun.

use crate::auth::password::hash_password_blocking;
use crate::config::Settings;
use crate::error::AppError;
use crate::schema::tables::{ROLES, USERS};
use crate::schema::Row;
use crate::store::{Predicate, Query, Store, Trashed};
use serde_json::{json, Map, Value};

pub const DEFAULT_ROLES: &[(&str, &str)] = &[("admin", "Administrator"), ("user", "User")];

fn object(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap_or_default()
}

async fn ensure_role(store: &dyn Store, code: &str, name: &str) -> Result<Row, AppError> {
    if let Some(existing) = store.first(Query::new(&ROLES).filter(Predicate::eq("code", code))).await? {
        return Ok(existing);
    }
    tracing::info!(code, "seeding role");
    Ok(store.insert(&ROLES, &object(json!({"code": code, "name": name}))).await?)
}

/// Seed roles, then the admin user when both phone and password are configured.
/// An existing user with that phone (trashed included) is left untouched.
pub async fn seed_defaults(store: &dyn Store, settings: &Settings) -> Result<(), AppError> {
    let mut admin_role = None;
    for (code, name) in DEFAULT_ROLES {
        let role = ensure_role(store, code, name).await?;
        if *code == "admin" {
            admin_role = Some(role.id);
        }
    }
    let (Some(phone), Some(password)) = (&settings.seed_admin_phone, &settings.seed_admin_password) else {
        return Ok(());
    };
    let existing = store
        .first(Query::new(&USERS).filter(Predicate::eq("phone", phone.as_str())).trashed(Trashed::Include))
        .await?;
    if existing.is_some() {
        return Ok(());
    }
    let hashed = hash_password_blocking(password.clone()).await?;
    let user = store
        .insert(
            &USERS,
            &object(json!({
                "phone": phone,
                "name": "Administrator",
                "role_id": admin_role,
                "password": hashed,
            })),
        )
        .await?;
    tracing::info!(user_id = user.id, "seeded admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        let settings = Settings {
            seed_admin_phone: Some("0900000000".into()),
            seed_admin_password: Some("secret-pass".into()),
            ..Settings::default()
        };
        seed_defaults(&store, &settings).await.unwrap();
        seed_defaults(&store, &settings).await.unwrap();
        assert_eq!(store.count(&Query::new(&ROLES)).await.unwrap(), 2);
        let users = store.fetch(&Query::new(&USERS)).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(verify_password("secret-pass", users[0].str_attr("password").unwrap()));
        let admin = store.find(&ROLES, users[0].i64_attr("role_id").unwrap(), Trashed::Exclude).await.unwrap();
        assert_eq!(admin.unwrap().str_attr("code"), Some("admin"));
    }

    #[tokio::test]
    async fn no_admin_without_credentials() {
        let store = MemoryStore::new();
        seed_defaults(&store, &Settings::default()).await.unwrap();
        assert_eq!(store.count(&Query::new(&USERS)).await.unwrap(), 0);
    }
}

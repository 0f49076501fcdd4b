//! Users: role / social-network filters and password hashing.

use super::int_filter;
use crate::auth::password::{hash_password_blocking, is_hashed};
use crate::error::AppError;
use crate::query::QueryParams;
use crate::schema::{parse_bool, Row};
use crate::service::{HookContext, ResourceHooks};
use crate::store::{Predicate, Query};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, Default)]
pub struct UserHooks;

/// Replace a plain `password` with its hash; a null password is dropped so the stored one stays.
pub(crate) async fn hash_input_password(mut data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
    match data.get("password") {
        Some(Value::String(p)) if !is_hashed(p) => {
            let hashed = hash_password_blocking(p.clone()).await?;
            data.insert("password".into(), Value::String(hashed));
        }
        Some(Value::Null) => {
            data.remove("password");
        }
        _ => {}
    }
    Ok(data)
}

#[async_trait]
impl ResourceHooks for UserHooks {
    fn apply_filters(&self, query: &mut Query, params: &QueryParams, _today: NaiveDate) -> Result<(), AppError> {
        if let Some(p) = int_filter(params, "role_id") {
            query.push(p);
        }
        if let Some(driver) = params.filled("sns_driver") {
            query.push(Predicate::eq("sns_driver", driver));
        }
        if params.has("has_sns") {
            let wants = params.single("has_sns").and_then(parse_bool).unwrap_or(false);
            query.push(if wants {
                Predicate::not_null("sns_id")
            } else {
                Predicate::is_null("sns_id")
            });
        }
        Ok(())
    }

    async fn before_create(&self, _ctx: &HookContext<'_>, data: Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        hash_input_password(data).await
    }

    async fn before_update(
        &self,
        _ctx: &HookContext<'_>,
        _existing: &Row,
        data: Map<String, Value>,
    ) -> Result<Map<String, Value>, AppError> {
        hash_input_password(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::schema::tables::USERS;
    use serde_json::json;

    #[tokio::test]
    async fn passwords_are_hashed_once() {
        let data = json!({"password": "secret123", "phone": "1"}).as_object().cloned().unwrap();
        let out = hash_input_password(data).await.unwrap();
        let stored = out["password"].as_str().unwrap().to_string();
        assert!(verify_password("secret123", &stored));
        let again = hash_input_password(out).await.unwrap();
        assert_eq!(again["password"], stored.as_str());
        let cleared = hash_input_password(json!({"password": null}).as_object().cloned().unwrap()).await.unwrap();
        assert!(!cleared.contains_key("password"));
    }

    #[tokio::test]
    async fn argon_prefixed_plain_password_is_still_hashed() {
        let data = json!({"password": "$argon2-lookalike"}).as_object().cloned().unwrap();
        let out = hash_input_password(data).await.unwrap();
        let stored = out["password"].as_str().unwrap();
        assert_ne!(stored, "$argon2-lookalike");
        assert!(verify_password("$argon2-lookalike", stored));
    }

    #[test]
    fn filters() {
        let mut q = Query::new(&USERS);
        let p = QueryParams::from_pairs([("role_id", "2"), ("has_sns", "0"), ("sns_driver", "google")]);
        UserHooks.apply_filters(&mut q, &p, chrono::Utc::now().date_naive()).unwrap();
        assert_eq!(q.predicates.len(), 3);
        let mut q = Query::new(&USERS);
        let word = QueryParams::from_pairs([("role_id", "admin")]);
        UserHooks.apply_filters(&mut q, &word, chrono::Utc::now().date_naive()).unwrap();
        assert!(matches!(&q.predicates[0], Predicate::In { values, .. } if values.is_empty()));
    }
}

//! Authentication handlers: login, logout, token refresh, profile, password and sessions.

use super::resource::body_to_map;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::{token, Caller};
use crate::error::AppError;
use crate::response::message;
use crate::schema::tables::USERS;
use crate::schema::Row;
use crate::service::relations;
use crate::service::{Mode, RequestValidator, RuleSet};
use crate::state::AppState;
use crate::store::{Predicate, Query, Store, Trashed};
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const TOKEN_TYPE: &str = "Bearer";

fn rules(specs: &[(&str, &str)]) -> Result<RuleSet, AppError> {
    let specs: BTreeMap<String, String> = specs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Ok(RuleSet::parse(&specs)?)
}

async fn validated(state: &AppState, rules: &RuleSet, body: Value) -> Result<Map<String, Value>, AppError> {
    let input = body_to_map(body)?;
    RequestValidator::new(state.store.as_ref())
        .validate(rules, &input, Mode::Full, None)
        .await
}

/// User JSON with its role loaded.
async fn user_json(state: &AppState, user: Row) -> Result<Value, AppError> {
    let mut rows = [user];
    relations::load(state.store.as_ref(), &USERS, &mut rows, &["role".to_string()]).await?;
    let [user] = rows;
    Ok(state.registry.transformers().row(&USERS, &user))
}

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// POST /login. Revokes every existing token of the user before issuing a new one.
pub async fn login(State(state): State<AppState>, Json(body): Json<Value>) -> Result<impl IntoResponse, AppError> {
    let rules = rules(&[("phone", "required|string"), ("password", "required|string")])?;
    let data = validated(&state, &rules, body).await?;
    let phone = str_field(&data, "phone");
    let store: &dyn Store = state.store.as_ref();
    let found = store
        .first(Query::new(&USERS).filter(Predicate::eq("phone", phone)).trashed(Trashed::Exclude))
        .await?;
    let mut user = None;
    if let Some(u) = found {
        if let Some(stored) = u.str_attr("password").map(str::to_owned) {
            if verify_password_blocking(str_field(&data, "password").to_owned(), stored).await {
                user = Some(u);
            }
        }
    }
    let Some(user) = user else {
        tracing::info!("login rejected");
        return Err(AppError::validation("phone", "The provided credentials are incorrect."));
    };
    token::revoke_all(store, user.id, None).await?;
    let (_, plain) = token::issue(store, user.id, token::DEFAULT_TOKEN_NAME).await?;
    tracing::info!(user_id = user.id, "login");
    let user = user_json(&state, user).await?;
    Ok(Json(json!({
        "message": "Login successful.",
        "user": user,
        "token": plain,
        "token_type": TOKEN_TYPE,
    })))
}

pub async fn logout(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse, AppError> {
    token::revoke(state.store.as_ref(), caller.token_id).await?;
    Ok(message("Logout successful."))
}

pub async fn logout_all(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse, AppError> {
    let revoked = token::revoke_all(state.store.as_ref(), caller.user.id, None).await?;
    tracing::info!(user_id = caller.user.id, revoked, "logout from all devices");
    Ok(message("Logout from all devices successful."))
}

pub async fn me(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse, AppError> {
    let user = user_json(&state, caller.user).await?;
    Ok(Json(json!({ "user": user })))
}

/// POST /refresh-token: swap the presented token for a new one.
pub async fn refresh(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse, AppError> {
    let store = state.store.as_ref();
    token::revoke(store, caller.token_id).await?;
    let (_, plain) = token::issue(store, caller.user.id, token::DEFAULT_TOKEN_NAME).await?;
    Ok(Json(json!({
        "message": "Token refreshed successfully.",
        "token": plain,
        "token_type": TOKEN_TYPE,
    })))
}

pub async fn change_password(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let rules = rules(&[
        ("current_password", "required|string"),
        ("password", "required|string|min:8|confirmed"),
    ])?
    .with_messages([
        ("current_password.required", "Please enter your current password."),
        ("password.required", "Please enter a new password."),
        ("password.min", "The new password must be at least 8 characters."),
        ("password.confirmed", "The password confirmation does not match."),
    ]);
    let data = validated(&state, &rules, body).await?;
    let current_ok = match caller.user.str_attr("password") {
        Some(stored) => verify_password_blocking(str_field(&data, "current_password").to_owned(), stored.to_owned()).await,
        None => false,
    };
    if !current_ok {
        return Err(AppError::validation("current_password", "The current password is incorrect."));
    }
    let hashed = hash_password_blocking(str_field(&data, "password").to_owned()).await?;
    let mut update = Map::new();
    update.insert("password".into(), Value::String(hashed));
    state.store.update(&USERS, caller.user.id, &update).await?;
    tracing::info!(user_id = caller.user.id, "password changed");
    Ok(message("Password changed successfully."))
}

/// GET /sessions: the caller's tokens, newest first.
pub async fn sessions(State(state): State<AppState>, caller: Caller) -> Result<impl IntoResponse, AppError> {
    let tokens = token::list_for_user(state.store.as_ref(), caller.user.id).await?;
    let sessions: Vec<Value> = tokens
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "name": t.get("name"),
                "last_used_at": t.get("last_used_at"),
                "created_at": crate::schema::format_timestamp(&t.created_at),
                "is_current": t.id == caller.token_id,
            })
        })
        .collect();
    Ok(Json(json!({ "sessions": sessions })))
}

/// DELETE /sessions: revoke one of the caller's other tokens.
pub async fn revoke_session(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let rules = rules(&[("token_id", "required|integer|exists:personal_access_tokens,id")])?;
    let data = validated(&state, &rules, body).await?;
    let token_id = data.get("token_id").and_then(Value::as_i64).unwrap_or_default();
    let store = state.store.as_ref();
    let owned = token::list_for_user(store, caller.user.id)
        .await?
        .into_iter()
        .any(|t| t.id == token_id);
    if !owned {
        return Err(AppError::NotFound("Session not found.".into()));
    }
    if token_id == caller.token_id {
        return Err(AppError::BadRequest("Cannot revoke current session.".into()));
    }
    token::revoke(store, token_id).await?;
    Ok(message("Session revoked successfully."))
}

//! Bearer-token authentication, password hashing and the role gate.

pub mod gate;
pub mod password;
pub mod token;

use crate::error::AppError;
use crate::schema::tables::{ROLES, USERS};
use crate::schema::Row;
use crate::state::AppState;
use crate::store::{Store, Trashed};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// The authenticated user behind a request.
#[derive(Clone, Debug)]
pub struct Caller {
    pub user: Row,
    pub role: Option<Row>,
    /// Token the request presented.
    pub token_id: i64,
}

impl Caller {
    pub fn role_code(&self) -> Option<&str> {
        self.role.as_ref().and_then(|r| r.str_attr("code"))
    }
}

fn bearer(req: &Request) -> Option<String> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve the caller for a bearer token: live token, non-trashed user, role if any.
pub async fn resolve_caller(store: &dyn Store, plain: &str) -> Result<Option<Caller>, AppError> {
    let Some(token_row) = token::find(store, plain).await? else {
        return Ok(None);
    };
    let Some(user_id) = token_row.i64_attr("user_id") else {
        return Ok(None);
    };
    let Some(user) = store.find(&USERS, user_id, Trashed::Exclude).await? else {
        return Ok(None);
    };
    let role = match user.i64_attr("role_id") {
        Some(role_id) => store.find(&ROLES, role_id, Trashed::Exclude).await?,
        None => None,
    };
    token::touch(store, token_row.id).await?;
    Ok(Some(Caller {
        user,
        role,
        token_id: token_row.id,
    }))
}

/// Attach a [`Caller`] to the request when a valid bearer token is presented. Never rejects.
pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(plain) = bearer(&req) {
        match resolve_caller(state.store.as_ref(), &plain).await {
            Ok(Some(caller)) => {
                tracing::debug!(user_id = caller.user.id, "authenticated request");
                req.extensions_mut().insert(caller);
            }
            Ok(None) => tracing::debug!("bearer token rejected"),
            Err(e) => return e.into_response(),
        }
    }
    next.run(req).await
}

/// 401 unless [`authenticate`] attached a caller.
pub async fn require_auth(req: Request, next: Next) -> Response {
    if req.extensions().get::<Caller>().is_none() {
        return AppError::Unauthenticated("Unauthenticated.".into()).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use serde_json::json;

    #[test]
    fn bearer_header_parsing() {
        let req = Request::builder().header(AUTHORIZATION, "Bearer 1|abc").body(Body::empty()).unwrap();
        assert_eq!(bearer(&req).as_deref(), Some("1|abc"));
        let req = Request::builder().header(AUTHORIZATION, "Basic xyz").body(Body::empty()).unwrap();
        assert!(bearer(&req).is_none());
        let req = Request::builder().body(Body::empty()).unwrap();
        assert!(bearer(&req).is_none());
    }

    #[tokio::test]
    async fn resolves_user_and_role() {
        let store = MemoryStore::new();
        store.insert(&ROLES, json!({"code": "admin"}).as_object().unwrap()).await.unwrap();
        let user = store
            .insert(&USERS, json!({"phone": "1", "role_id": 1}).as_object().unwrap())
            .await
            .unwrap();
        let (_, plain) = token::issue(&store, user.id, token::DEFAULT_TOKEN_NAME).await.unwrap();
        let caller = resolve_caller(&store, &plain).await.unwrap().unwrap();
        assert_eq!(caller.user.id, user.id);
        assert_eq!(caller.role_code(), Some("admin"));

        store.soft_delete(&USERS, user.id).await.unwrap();
        assert!(resolve_caller(&store, &plain).await.unwrap().is_none());
    }
}

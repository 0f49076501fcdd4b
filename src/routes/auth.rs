//! Authentication routes. Only login is public.

use crate::handlers::auth::{change_password, login, logout, logout_all, me, refresh, revoke_session, sessions};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn public_auth_routes(state: AppState) -> Router {
    Router::new().route("/login", post(login)).with_state(state)
}

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/logout-all", post(logout_all))
        .route("/me", get(me))
        .route("/refresh", post(refresh))
        .route("/change-password", post(change_password))
        .route("/sessions", get(sessions).delete(revoke_session))
        .with_state(state)
}

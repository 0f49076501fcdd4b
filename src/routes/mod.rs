//! Router assembly.

pub mod auth;
pub mod common;
pub mod resource;

pub use auth::{auth_routes, public_auth_routes};
pub use common::common_routes;
pub use resource::resource_routes;

use crate::auth::{authenticate, require_auth};
use crate::state::AppState;
use axum::{middleware, Router};

pub const API_PREFIX: &str = "/api/v1";

/// Full application: common routes at the root, the API under [`API_PREFIX`].
/// Every API route sees the optional caller; all but login require one.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth_routes(state.clone()))
        .merge(resource_routes(state.clone()))
        .route_layer(middleware::from_fn(require_auth));
    let api = Router::new()
        .merge(public_auth_routes(state.clone()))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));
    Router::new().merge(common_routes(state)).nest(API_PREFIX, api)
}

//! Resource routes. Handlers resolve the resource from the first path segment.

use crate::handlers::resource::{create, delete, force_delete, list, read, replace, restore, update};
use crate::state::AppState;
use axum::{
    routing::{delete as delete_route, get, post},
    Router,
};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(list).post(create))
        .route("/:resource/:id", get(read).put(replace).patch(update).delete(delete))
        .route("/:resource/:id/restore", post(restore))
        .route("/:resource/:id/force-delete", delete_route(force_delete))
        .with_state(state)
}

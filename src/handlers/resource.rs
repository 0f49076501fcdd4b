//! Resource handlers: list, create, read, update, delete, restore, force delete.

use crate::auth::{gate, Caller};
use crate::error::AppError;
use crate::query::QueryParams;
use crate::resources::Resource;
use crate::response::{message, success_many, success_one, success_one_ok};
use crate::service::{Mode, ResourceEngine};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{Map, Value};

fn resource<'a>(state: &'a AppState, path_segment: &str) -> Result<&'a Resource, AppError> {
    state
        .registry
        .get(path_segment)
        .ok_or_else(|| AppError::NotFound(format!("Resource '{}' not found.", path_segment)))
}

/// Route ids are integers; anything else cannot match a row.
fn parse_id(resource: &Resource, id_str: &str) -> Result<i64, AppError> {
    id_str
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::NotFound(format!("No {} found with id {}.", resource.config.table.model, id_str)))
}

pub(crate) fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        Value::Null => Ok(Map::new()),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn engine<'a>(state: &'a AppState, resource: &'a Resource, caller: &'a Caller) -> ResourceEngine<'a> {
    ResourceEngine::new(&resource.config, resource.hooks.as_ref(), state.store.as_ref(), Some(caller))
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

fn render(state: &AppState, resource: &Resource, row: &crate::schema::Row) -> Value {
    state.registry.transformers().row(resource.config.table, row)
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    gate::authorize(Some(&caller), &resource.config.roles)?;
    let params = QueryParams::from_pairs(pairs);
    let page = engine(&state, resource, &caller).list(&params, today()).await?;
    let data = state.registry.transformers().rows(resource.config.table, &page.items);
    Ok(success_many(data, page.meta))
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    gate::authorize(Some(&caller), &resource.config.roles)?;
    let input = body_to_map(body)?;
    let row = engine(&state, resource, &caller).create(&input).await?;
    Ok(success_one(render(&state, resource, &row)))
}

pub async fn read(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    gate::authorize(Some(&caller), &resource.config.roles)?;
    let id = parse_id(resource, &id_str)?;
    let row = engine(&state, resource, &caller).read(id).await?;
    Ok(success_one_ok(render(&state, resource, &row)))
}

async fn update_with(
    state: AppState,
    caller: Caller,
    path_segment: String,
    id_str: String,
    body: Value,
    mode: Mode,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    gate::authorize(Some(&caller), &resource.config.roles)?;
    let id = parse_id(resource, &id_str)?;
    let input = body_to_map(body)?;
    let row = engine(&state, resource, &caller).update(id, &input, mode).await?;
    Ok(success_one_ok(render(&state, resource, &row)))
}

/// PUT: every create-time required field must be present.
pub async fn replace(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    update_with(state, caller, path_segment, id_str, body, Mode::Full).await
}

/// PATCH: only fields present are validated.
pub async fn update(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    update_with(state, caller, path_segment, id_str, body, Mode::Partial).await
}

pub async fn delete(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    gate::authorize(Some(&caller), &resource.config.roles)?;
    let id = parse_id(resource, &id_str)?;
    let msg = engine(&state, resource, &caller).delete(id).await?;
    Ok(message(msg))
}

/// Trash operations pass both the resource gate and the trash gate.
fn authorize_trash(caller: &Caller, resource: &Resource) -> Result<(), AppError> {
    gate::authorize(Some(caller), &resource.config.roles)?;
    gate::authorize(Some(caller), &resource.config.trash_roles)
}

pub async fn restore(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    authorize_trash(&caller, resource)?;
    let id = parse_id(resource, &id_str)?;
    let row = engine(&state, resource, &caller).restore(id).await?;
    Ok(success_one_ok(render(&state, resource, &row)))
}

pub async fn force_delete(
    State(state): State<AppState>,
    caller: Caller,
    Path((path_segment, id_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let resource = resource(&state, &path_segment)?;
    authorize_trash(&caller, resource)?;
    let id = parse_id(resource, &id_str)?;
    let msg = engine(&state, resource, &caller).force_delete(id).await?;
    Ok(message(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_must_be_an_object() {
        assert!(body_to_map(json!({"a": 1})).is_ok());
        assert!(body_to_map(Value::Null).unwrap().is_empty());
        assert!(matches!(body_to_map(json!([1])), Err(AppError::BadRequest(_))));
    }
}

//! Typed errors and HTTP mapping.

use crate::auth::password::HashError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("invalid rule for {field}: {message}")]
    InvalidRule { field: String, message: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("invalid value for {table}.{column}: {value}")]
    InvalidValue { table: &'static str, column: String, value: Value },
    #[error("{table}.{column} cannot be null")]
    NotNull { table: &'static str, column: &'static str },
    #[error("unsupported query: {0}")]
    Unsupported(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Field-keyed validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        FieldErrors::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut e = FieldErrors::new();
        e.add(field, message);
        e
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(FieldErrors::single(field, message))
    }

    /// Not-found for a model by id, e.g. "No User found with id 5."
    pub fn model_not_found(model: &str, id: i64) -> Self {
        AppError::NotFound(format!("No {} found with id {}.", model, id))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unsupported(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) | AppError::Storage(_) | AppError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            AppError::Validation(errors) => ErrorBody {
                message: "The given data was invalid.".into(),
                error: None,
                errors: Some(errors),
            },
            AppError::Unauthenticated(message) => ErrorBody {
                message,
                error: Some("Unauthorized"),
                errors: None,
            },
            AppError::Forbidden(message) => ErrorBody {
                message,
                error: Some("Forbidden"),
                errors: None,
            },
            AppError::NotFound(message) | AppError::Unsupported(message) | AppError::BadRequest(message) => ErrorBody {
                message,
                error: None,
                errors: None,
            },
            AppError::Config(e) => {
                tracing::error!(error = %e, "configuration error");
                server_error()
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                server_error()
            }
            AppError::Hash(e) => {
                tracing::error!(error = %e, "password hashing error");
                server_error()
            }
        };
        (status, Json(body)).into_response()
    }
}

fn server_error() -> ErrorBody {
    ErrorBody {
        message: "Server Error".into(),
        error: None,
        errors: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_deterministic() {
        assert_eq!(AppError::validation("phone", "taken").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::model_not_found("User", 1).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthenticated("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Unsupported("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Storage(StoreError::Poisoned).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn field_errors_serialize_as_map() {
        let mut e = FieldErrors::new();
        e.add("phone", "The phone number has already been taken.");
        e.add("phone", "second");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["phone"][1], "second");
    }

    #[test]
    fn model_not_found_message() {
        assert_eq!(AppError::model_not_found("Shop", 9).to_string(), "No Shop found with id 9.");
    }
}

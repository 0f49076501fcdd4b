//! Standard response envelopes.

use crate::query::PaginationMeta;
use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    pub meta: Timestamp,
}

#[derive(Serialize)]
pub struct Timestamp {
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

fn now() -> Timestamp {
    Timestamp {
        timestamp: crate::schema::format_timestamp(&chrono::Utc::now()),
    }
}

/// 201 with a single resource.
pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: now() }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: now() }))
}

pub fn success_many<T: Serialize>(data: Vec<T>, meta: PaginationMeta) -> (StatusCode, Json<SuccessMany<T>>) {
    (StatusCode::OK, Json(SuccessMany { data, meta }))
}

pub fn message(message: impl Into<String>) -> (StatusCode, Json<Message>) {
    (
        StatusCode::OK,
        Json(Message {
            message: message.into(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PageRequest;
    use serde_json::json;

    #[test]
    fn envelopes_serialize() {
        let (status, Json(one)) = success_one(json!({"id": 1}));
        assert_eq!(status, StatusCode::CREATED);
        let v = serde_json::to_value(&one).unwrap();
        assert_eq!(v["data"]["id"], 1);
        assert!(v["meta"]["timestamp"].as_str().unwrap().ends_with('Z'));

        let meta = PaginationMeta::new(PageRequest { page: 1, per_page: 15 }, 0, 0);
        let (_, Json(many)) = success_many::<serde_json::Value>(vec![], meta);
        let v = serde_json::to_value(&many).unwrap();
        assert_eq!(v["meta"]["last_page"], 1);
        assert_eq!(v["meta"]["from"], serde_json::Value::Null);

        let (_, Json(m)) = message("Role deleted successfully");
        assert_eq!(serde_json::to_value(&m).unwrap(), json!({"message": "Role deleted successfully"}));
    }
}

use super::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One persisted record plus whatever relations were eager-loaded for this request.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub attributes: Map<String, Value>,
    /// Absent key: relation not loaded. Present: loaded (possibly empty).
    pub relations: BTreeMap<String, Loaded>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Loaded {
    One(Option<Box<Row>>),
    Many(Vec<Row>),
}

impl Row {
    /// Column value as JSON, system columns included. Missing attributes read as null.
    pub fn get(&self, column: &str) -> Value {
        match column {
            "id" => Value::from(self.id),
            "created_at" => Value::String(format_timestamp(&self.created_at)),
            "updated_at" => Value::String(format_timestamp(&self.updated_at)),
            "deleted_at" => self
                .deleted_at
                .map(|t| Value::String(format_timestamp(&t)))
                .unwrap_or(Value::Null),
            _ => self.attributes.get(column).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn i64_attr(&self, name: &str) -> Option<i64> {
        self.attributes.get(name).and_then(Value::as_i64)
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    /// Related row of a loaded to-one relation.
    pub fn related_one(&self, name: &str) -> Option<&Row> {
        match self.relations.get(name) {
            Some(Loaded::One(Some(row))) => Some(row),
            _ => None,
        }
    }

    /// Build a row from a flat JSON object (as returned by the SQL layer).
    pub fn from_json(mut map: Map<String, Value>) -> Result<Row, String> {
        let id = map
            .remove("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| "row has no integer id".to_string())?;
        let mut ts = |key: &str| -> Result<Option<DateTime<Utc>>, String> {
            match map.remove(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => parse_timestamp(&s)
                    .map(Some)
                    .ok_or_else(|| format!("bad {} timestamp: {}", key, s)),
                Some(other) => Err(format!("bad {} value: {}", key, other)),
            }
        };
        let created_at = ts("created_at")?.unwrap_or_else(Utc::now);
        let updated_at = ts("updated_at")?.unwrap_or(created_at);
        let deleted_at = ts("deleted_at")?;
        Ok(Row {
            id,
            created_at,
            updated_at,
            deleted_at,
            attributes: map,
            relations: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_splits_system_columns() {
        let map = json!({
            "id": 3,
            "created_at": "2024-01-02T03:04:05Z",
            "updated_at": "2024-01-02T03:04:05Z",
            "deleted_at": null,
            "name": "Alice"
        });
        let row = Row::from_json(map.as_object().unwrap().clone()).unwrap();
        assert_eq!(row.id, 3);
        assert!(!row.is_trashed());
        assert_eq!(row.str_attr("name"), Some("Alice"));
        assert_eq!(row.get("created_at"), json!("2024-01-02T03:04:05.000000Z"));
        assert!(row.attributes.get("created_at").is_none());
    }

    #[test]
    fn from_json_requires_id() {
        let map = json!({ "name": "x" });
        assert!(Row::from_json(map.as_object().unwrap().clone()).is_err());
    }
}

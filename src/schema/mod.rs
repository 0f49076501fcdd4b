//! Static table definitions: columns, fillable sets, soft-delete support and named relations.
//! Every identifier that reaches SQL comes from here, never from request input.

mod row;
pub mod tables;

pub use row::*;
pub use tables::{table, TABLES};

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Storage type of a column. Drives value coercion (both stores) and SQL casts (PostgreSQL).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Text,
    Bool,
    Timestamp,
}

impl ColumnType {
    /// PostgreSQL type used in DDL and placeholder casts.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::BigInt => "bigint",
            ColumnType::Text => "text",
            ColumnType::Bool => "boolean",
            ColumnType::Timestamp => "timestamptz",
        }
    }

    /// Coerce an incoming JSON value to this column's canonical JSON form. None when the value cannot be stored.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            ColumnType::BigInt => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                    .map(Value::from),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(i64::from(*b))),
                _ => None,
            },
            ColumnType::Text => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
            ColumnType::Bool => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(Value::Bool(false)),
                    Some(1) => Some(Value::Bool(true)),
                    _ => None,
                },
                Value::String(s) => parse_bool(s).map(Value::Bool),
                _ => None,
            },
            ColumnType::Timestamp => value
                .as_str()
                .and_then(parse_timestamp)
                .map(|t| Value::String(format_timestamp(&t))),
        }
    }
}

/// Loose boolean parsing for query strings and form-ish input ("1", "true", "on", "yes").
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Literal default applied when an insert omits the column.
    pub default: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            nullable: false,
            default: None,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default_to(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }
}

/// Owner types that may hold polymorphic file attachments. Stored as `<morph>_type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OwnerType {
    Shop,
    News,
}

impl OwnerType {
    pub const ALL: [OwnerType; 2] = [OwnerType::Shop, OwnerType::News];

    pub fn as_str(self) -> &'static str {
        match self {
            OwnerType::Shop => "shop",
            OwnerType::News => "news",
        }
    }

    /// Lookup table from owner tag to the table holding the owner rows.
    pub fn table(self) -> &'static Table {
        match self {
            OwnerType::Shop => &tables::SHOP,
            OwnerType::News => &tables::NEWS,
        }
    }
}

impl std::str::FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OwnerType::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| format!("unknown owner type: {}", s))
    }
}

#[derive(Clone, Copy, Debug)]
pub enum RelationKind {
    /// We hold `foreign_key` pointing at `target.id`.
    BelongsTo { target: &'static str, foreign_key: &'static str },
    /// `target.foreign_key` points at our id; at most one row.
    HasOne { target: &'static str, foreign_key: &'static str },
    /// `target.foreign_key` points at our id.
    HasMany { target: &'static str, foreign_key: &'static str },
    /// `target.<morph>_id` points at our id with `target.<morph>_type = owner`.
    MorphMany { target: &'static str, morph: &'static str, owner: OwnerType },
    /// We hold `<morph>_type` / `<morph>_id`; target resolved through [`OwnerType::table`].
    MorphTo { morph: &'static str },
}

#[derive(Clone, Copy, Debug)]
pub struct Relation {
    pub name: &'static str,
    pub kind: RelationKind,
}

impl Relation {
    pub fn is_to_one(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::BelongsTo { .. } | RelationKind::HasOne { .. } | RelationKind::MorphTo { .. }
        )
    }

    /// Target table for non-polymorphic relations (and morph-many, whose target is fixed).
    pub fn target(&self) -> Option<&'static Table> {
        match self.kind {
            RelationKind::BelongsTo { target, .. }
            | RelationKind::HasOne { target, .. }
            | RelationKind::HasMany { target, .. }
            | RelationKind::MorphMany { target, .. } => table(target),
            RelationKind::MorphTo { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    /// Model name used in acknowledgment and not-found messages.
    pub model: &'static str,
    pub columns: &'static [Column],
    /// Columns request input may write.
    pub fillable: &'static [&'static str],
    pub soft_deletes: bool,
    pub relations: &'static [Relation],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether `name` is addressable in predicates and ordering (attributes plus system columns).
    pub fn has_column(&self, name: &str) -> bool {
        matches!(name, "id" | "created_at" | "updated_at")
            || (name == "deleted_at" && self.soft_deletes)
            || self.column(name).is_some()
    }

    /// Type of any addressable column, system columns included.
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        match name {
            "id" => Some(ColumnType::BigInt),
            "created_at" | "updated_at" | "deleted_at" => Some(ColumnType::Timestamp),
            _ => self.column(name).map(|c| c.ty),
        }
    }

    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_fillable(&self, name: &str) -> bool {
        self.fillable.contains(&name)
    }
}

/// Parse the timestamp shapes accepted from clients and stores: RFC 3339, `Y-m-d H:i:s`, `Y-m-d`.
pub fn parse_timestamp(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let s = s.trim();
    if let Ok(t) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&chrono::Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// ISO-8601 with microseconds and `Z`, the shape used in every API response.
pub fn format_timestamp(t: &chrono::DateTime<chrono::Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_numeric_strings_for_bigint() {
        assert_eq!(ColumnType::BigInt.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(ColumnType::BigInt.coerce(&json!(7.0)), Some(json!(7)));
        assert_eq!(ColumnType::BigInt.coerce(&json!("abc")), None);
    }

    #[test]
    fn coerces_loose_booleans() {
        assert_eq!(ColumnType::Bool.coerce(&json!("yes")), Some(json!(true)));
        assert_eq!(ColumnType::Bool.coerce(&json!(0)), Some(json!(false)));
        assert_eq!(ColumnType::Bool.coerce(&json!("maybe")), None);
    }

    #[test]
    fn normalizes_timestamps() {
        let v = ColumnType::Timestamp.coerce(&json!("2024-03-05 10:00:00")).unwrap();
        assert_eq!(v, json!("2024-03-05T10:00:00.000000Z"));
    }

    #[test]
    fn owner_type_lookup() {
        assert_eq!("news".parse::<OwnerType>().unwrap().table().name, "news");
        assert!("job".parse::<OwnerType>().is_err());
    }
}

//! Typed bind values. Every placeholder in generated SQL carries an explicit cast, and each value
//! reports its own PostgreSQL type so the server never has to guess.

use crate::schema::{parse_timestamp, ColumnType};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl PgBindValue {
    /// Bind form of a JSON value stored in a column of type `ty`. None when the value does not fit the column.
    pub fn for_column(ty: ColumnType, v: &Value) -> Option<Self> {
        let v = ty.coerce(v)?;
        Some(match (ty, v) {
            (_, Value::Null) => PgBindValue::Null,
            (ColumnType::BigInt, v) => PgBindValue::I64(v.as_i64()?),
            (ColumnType::Bool, v) => PgBindValue::Bool(v.as_bool()?),
            (ColumnType::Text, Value::String(s)) => PgBindValue::String(s),
            (ColumnType::Timestamp, Value::String(s)) => PgBindValue::Timestamp(parse_timestamp(&s)?),
            _ => return None,
        })
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<String> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf)?,
            PgBindValue::Timestamp(t) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(t, buf)?,
            PgBindValue::Date(d) => <NaiveDate as Encode<Postgres>>::encode_by_ref(d, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => PgTypeInfo::with_name("TEXT"),
            PgBindValue::Bool(_) => PgTypeInfo::with_name("BOOL"),
            PgBindValue::I64(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::F64(_) => PgTypeInfo::with_name("FLOAT8"),
            PgBindValue::Timestamp(_) => PgTypeInfo::with_name("TIMESTAMPTZ"),
            PgBindValue::Date(_) => PgTypeInfo::with_name("DATE"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binds_follow_column_type() {
        assert_eq!(PgBindValue::for_column(ColumnType::BigInt, &json!("12")), Some(PgBindValue::I64(12)));
        assert_eq!(PgBindValue::for_column(ColumnType::Text, &json!(12)), Some(PgBindValue::String("12".into())));
        assert_eq!(PgBindValue::for_column(ColumnType::Bool, &json!(null)), Some(PgBindValue::Null));
        assert_eq!(PgBindValue::for_column(ColumnType::BigInt, &json!("x")), None);
        assert!(matches!(
            PgBindValue::for_column(ColumnType::Timestamp, &json!("2024-01-01")),
            Some(PgBindValue::Timestamp(_))
        ));
    }
}

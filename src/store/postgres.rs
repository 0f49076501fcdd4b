use super::{prepare_write, Query, Store};
use crate::error::StoreError;
use crate::schema::{format_timestamp, ColumnType, Row, Table};
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bound(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

/// Decode one cell by its declared column type.
fn cell_to_value(row: &PgRow, name: &str, ty: ColumnType) -> Result<Value, sqlx::Error> {
    use sqlx::Row as _;
    Ok(match ty {
        ColumnType::BigInt => row.try_get::<Option<i64>, _>(name)?.map(Value::from),
        ColumnType::Text => row.try_get::<Option<String>, _>(name)?.map(Value::String),
        ColumnType::Bool => row.try_get::<Option<bool>, _>(name)?.map(Value::Bool),
        ColumnType::Timestamp => row
            .try_get::<Option<DateTime<Utc>>, _>(name)?
            .map(|t| Value::String(format_timestamp(&t))),
    }
    .unwrap_or(Value::Null))
}

fn row_to_entity(table: &Table, row: &PgRow) -> Result<Row, StoreError> {
    let mut map = Map::new();
    let mut system = vec!["id", "created_at", "updated_at"];
    if table.soft_deletes {
        system.push("deleted_at");
    }
    for name in system {
        let ty = table.column_type(name).unwrap_or(ColumnType::Text);
        map.insert(name.to_string(), cell_to_value(row, name, ty)?);
    }
    for c in table.columns {
        map.insert(c.name.to_string(), cell_to_value(row, c.name, c.ty)?);
    }
    Row::from_json(map).map_err(StoreError::Corrupt)
}

#[async_trait]
impl Store for PgStore {
    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        use sqlx::Row as _;
        let q = sql::count(query)?;
        let row = bound(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError> {
        let q = sql::select(query)?;
        tracing::debug!(sql = %q.sql, params = q.params.len(), "select");
        let rows = bound(&q).fetch_all(&self.pool).await?;
        rows.iter().map(|r| row_to_entity(query.table, r)).collect()
    }

    async fn insert(&self, table: &'static Table, data: &Map<String, Value>) -> Result<Row, StoreError> {
        let values = prepare_write(table, data)?;
        let q = sql::insert(table, &values)?;
        let row = bound(&q).fetch_one(&self.pool).await?;
        row_to_entity(table, &row)
    }

    async fn update(&self, table: &'static Table, id: i64, data: &Map<String, Value>) -> Result<Option<Row>, StoreError> {
        let values = prepare_write(table, data)?;
        let q = sql::update(table, id, &values)?;
        let row = bound(&q).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_entity(table, &r)).transpose()
    }

    async fn soft_delete(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError> {
        let q = sql::set_tombstone(table, id, true)?;
        let row = bound(&q).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_entity(table, &r)).transpose()
    }

    async fn restore(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError> {
        let q = sql::set_tombstone(table, id, false)?;
        let row = bound(&q).fetch_optional(&self.pool).await?;
        row.map(|r| row_to_entity(table, &r)).transpose()
    }

    async fn delete(&self, table: &'static Table, id: i64) -> Result<bool, StoreError> {
        let q = sql::delete(table, id);
        let done = bound(&q).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_where(&self, query: &Query) -> Result<u64, StoreError> {
        let q = sql::delete_where(query)?;
        let done = bound(&q).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Unsupported("DATABASE_URL has no database path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_targets_postgres_database() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/shopdb?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "shopdb");
    }
}

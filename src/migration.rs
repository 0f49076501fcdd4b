//! Create the schema in PostgreSQL from the static table definitions.
//! Idempotent: tables and indexes use IF NOT EXISTS.

use crate::error::AppError;
use crate::schema::{Column, ColumnType, Table, TABLES};
use crate::sql::quoted;
use sqlx::PgPool;

/// Extra indexes: (table, index name, columns, unique).
const INDEXES: &[(&str, &str, &[&str], bool)] = &[
    ("users", "users_phone_unique", &["phone"], true),
    ("files", "files_fileable_index", &["fileable_id", "fileable_type"], false),
    ("personal_access_tokens", "personal_access_tokens_user_id_index", &["user_id"], false),
];

fn default_clause(column: &Column) -> String {
    match column.default {
        None => String::new(),
        Some(v) if column.ty == ColumnType::Text => format!(" DEFAULT '{}'", v.replace('\'', "''")),
        Some(v) => format!(" DEFAULT {}", v),
    }
}

fn column_ddl(column: &Column) -> String {
    format!(
        "{} {}{}{}",
        quoted(column.name),
        column.ty.pg_type(),
        if column.nullable { "" } else { " NOT NULL" },
        default_clause(column)
    )
}

/// CREATE TABLE statement for one table.
pub fn create_table_sql(table: &Table) -> String {
    let mut cols = vec![format!("{} BIGSERIAL PRIMARY KEY", quoted("id"))];
    cols.extend(table.columns.iter().map(column_ddl));
    cols.push(format!("{} timestamptz NOT NULL DEFAULT now()", quoted("created_at")));
    cols.push(format!("{} timestamptz NOT NULL DEFAULT now()", quoted("updated_at")));
    if table.soft_deletes {
        cols.push(format!("{} timestamptz", quoted("deleted_at")));
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quoted(table.name), cols.join(", "))
}

fn create_index_sql(table: &str, name: &str, columns: &[&str], unique: bool) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quoted(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quoted(name),
        quoted(table),
        cols.join(", ")
    )
}

/// Every statement [`ensure_schema`] runs, in order.
pub fn schema_statements() -> Vec<String> {
    let mut out: Vec<String> = TABLES.iter().map(|t| create_table_sql(t)).collect();
    out.extend(
        INDEXES
            .iter()
            .map(|(table, name, columns, unique)| create_index_sql(table, name, columns, *unique)),
    );
    out
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    for sql in schema_statements() {
        tracing::debug!(sql = %sql, "schema");
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(crate::error::StoreError::from)?;
    }
    tracing::info!(tables = TABLES.len(), "schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables::{NEWS, USERS};

    #[test]
    fn soft_delete_tables_get_tombstone_column() {
        let sql = create_table_sql(&USERS);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(sql.contains("\"deleted_at\" timestamptz"));
        let news = create_table_sql(&NEWS);
        assert!(!news.contains("deleted_at"));
        assert!(news.contains("\"is_published\" boolean NOT NULL DEFAULT false"));
        assert!(news.contains("\"id\" BIGSERIAL PRIMARY KEY"));
    }

    #[test]
    fn text_defaults_are_quoted() {
        let sql = create_table_sql(&crate::schema::tables::FILES);
        assert!(sql.contains("\"type\" text NOT NULL DEFAULT 'image'"));
    }

    #[test]
    fn indexes_follow_tables() {
        let stmts = schema_statements();
        assert_eq!(stmts.len(), TABLES.len() + INDEXES.len());
        assert!(stmts.last().unwrap().contains("INDEX IF NOT EXISTS"));
        assert!(stmts.iter().any(|s| s.starts_with("CREATE UNIQUE INDEX") && s.contains("\"phone\"")));
    }
}

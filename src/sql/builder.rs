//! Compiles [`Query`] descriptions and row writes into parameterized PostgreSQL.

use super::params::PgBindValue;
use crate::schema::{ColumnType, OwnerType, Relation, RelationKind, Table};
use crate::error::StoreError;
use crate::store::{check_query, LikeAnchor, Order, Predicate, Query, Trashed, EARTH_RADIUS_KM};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (identifiers come from the static schema only).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// Placeholder with an explicit cast, e.g. `$3::bigint`.
    fn placeholder(&mut self, ty: ColumnType, v: PgBindValue) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, ty.pg_type())
    }
}

/// Columns selected for every row, system columns first.
pub fn select_list(table: &Table, alias: Option<&str>) -> String {
    let prefix = alias.map(|a| format!("{}.", a)).unwrap_or_default();
    let mut cols: Vec<String> = ["id", "created_at", "updated_at"]
        .iter()
        .map(|c| format!("{}{}", prefix, quoted(c)))
        .collect();
    if table.soft_deletes {
        cols.push(format!("{}{}", prefix, quoted("deleted_at")));
    }
    cols.extend(table.columns.iter().map(|c| format!("{}{}", prefix, quoted(c.name))));
    cols.join(", ")
}

/// Escape LIKE metacharacters so the needle matches literally.
fn like_pattern(needle: &str, anchor: LikeAnchor) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    match anchor {
        LikeAnchor::Start => format!("{}%", escaped),
        LikeAnchor::End => format!("%{}", escaped),
        LikeAnchor::Anywhere => format!("%{}%", escaped),
    }
}

struct Compiler {
    buf: QueryBuf,
    aliases: usize,
}

impl Compiler {
    fn new() -> Self {
        Compiler {
            buf: QueryBuf::default(),
            aliases: 0,
        }
    }

    fn next_alias(&mut self) -> String {
        self.aliases += 1;
        format!("t{}", self.aliases)
    }

    fn column_type(table: &Table, column: &str) -> ColumnType {
        table.column_type(column).unwrap_or(ColumnType::Text)
    }

    fn bind(&mut self, table: &Table, column: &str, v: &Value) -> Option<String> {
        let ty = Self::column_type(table, column);
        match PgBindValue::for_column(ty, v)? {
            PgBindValue::Null => None,
            b => Some(self.buf.placeholder(ty, b)),
        }
    }

    /// Date portion of a timestamp column, in UTC.
    fn date_expr(table: &Table, alias: &str, column: &str) -> Option<String> {
        (Self::column_type(table, column) == ColumnType::Timestamp)
            .then(|| format!("CAST(({}.{} AT TIME ZONE 'UTC') AS date)", alias, quoted(column)))
    }

    fn trashed_clause(table: &Table, alias: &str, trashed: Trashed) -> Option<String> {
        if !table.soft_deletes {
            return None;
        }
        match trashed {
            Trashed::Exclude => Some(format!("{}.{} IS NULL", alias, quoted("deleted_at"))),
            Trashed::Only => Some(format!("{}.{} IS NOT NULL", alias, quoted("deleted_at"))),
            Trashed::Include => None,
        }
    }

    fn predicate(&mut self, table: &'static Table, alias: &str, p: &Predicate) -> String {
        let col = |c: &str| format!("{}.{}", alias, quoted(c));
        match p {
            Predicate::Compare { column, op, value } => match self.bind(table, column, value) {
                Some(ph) => format!("{} {} {}", col(column), op.sql(), ph),
                None => "FALSE".into(),
            },
            Predicate::Like { column, needle, anchor } => {
                let n = self.buf.push_param(PgBindValue::String(like_pattern(needle, *anchor)));
                format!("CAST({} AS text) ILIKE ${}::text", col(column), n)
            }
            Predicate::In { column, values, negated } => {
                let phs: Vec<String> = values.iter().filter_map(|v| self.bind(table, column, v)).collect();
                match (phs.is_empty(), negated) {
                    (true, false) => "FALSE".into(),
                    (true, true) => format!("{} IS NOT NULL", col(column)),
                    (false, false) => format!("{} IN ({})", col(column), phs.join(", ")),
                    (false, true) => format!("{} NOT IN ({})", col(column), phs.join(", ")),
                }
            }
            Predicate::Null { column, negated } => {
                format!("{} IS {}NULL", col(column), if *negated { "NOT " } else { "" })
            }
            Predicate::Between { column, low, high, negated } => {
                match (self.bind(table, column, low), self.bind(table, column, high)) {
                    (Some(lo), Some(hi)) => format!(
                        "{} {}BETWEEN {} AND {}",
                        col(column),
                        if *negated { "NOT " } else { "" },
                        lo,
                        hi
                    ),
                    _ => "FALSE".into(),
                }
            }
            Predicate::OnDate { column, date } => match Self::date_expr(table, alias, column) {
                Some(expr) => {
                    let n = self.buf.push_param(PgBindValue::Date(*date));
                    format!("{} = ${}::date", expr, n)
                }
                None => "FALSE".into(),
            },
            Predicate::DateBetween { column, from, to } => match Self::date_expr(table, alias, column) {
                Some(expr) => {
                    let a = self.buf.push_param(PgBindValue::Date(*from));
                    let b = self.buf.push_param(PgBindValue::Date(*to));
                    format!("{} BETWEEN ${}::date AND ${}::date", expr, a, b)
                }
                None => "FALSE".into(),
            },
            Predicate::Has { relation, predicate } => self.exists(alias, relation, predicate),
            Predicate::WithinRadius { column, origin, radius_km } => {
                let c = col(column);
                let lat = self.buf.push_param(PgBindValue::F64(origin.lat));
                let lng = self.buf.push_param(PgBindValue::F64(origin.lng));
                let r = self.buf.push_param(PgBindValue::F64(*radius_km));
                let p_lat = format!("CAST(btrim(split_part({}, ',', 1)) AS float8)", c);
                let p_lng = format!("CAST(btrim(split_part({}, ',', 2)) AS float8)", c);
                format!(
                    "(CASE WHEN {c} ~ '^\\s*-?([0-9]+\\.?[0-9]*|\\.[0-9]+)\\s*,\\s*-?([0-9]+\\.?[0-9]*|\\.[0-9]+)\\s*$' \
                     THEN 2 * {earth} * asin(least(1, sqrt(\
                     power(sin(radians({p_lat} - ${lat}::float8) / 2), 2) + \
                     cos(radians(${lat}::float8)) * cos(radians({p_lat})) * \
                     power(sin(radians({p_lng} - ${lng}::float8) / 2), 2)))) \
                     END) <= ${r}::float8",
                    c = c,
                    earth = EARTH_RADIUS_KM,
                    p_lat = p_lat,
                    p_lng = p_lng,
                    lat = lat,
                    lng = lng,
                    r = r,
                )
            }
            Predicate::Any(ps) if ps.is_empty() => "FALSE".into(),
            Predicate::All(ps) if ps.is_empty() => "TRUE".into(),
            Predicate::Any(ps) => {
                let parts: Vec<String> = ps.iter().map(|p| self.predicate(table, alias, p)).collect();
                format!("({})", parts.join(" OR "))
            }
            Predicate::All(ps) => {
                let parts: Vec<String> = ps.iter().map(|p| self.predicate(table, alias, p)).collect();
                format!("({})", parts.join(" AND "))
            }
        }
    }

    /// Join condition between an outer row (`alias`) and a related row (`inner`), plus the related table.
    fn join(&mut self, alias: &str, inner: &str, relation: &Relation) -> Vec<(&'static Table, String)> {
        match relation.kind {
            RelationKind::BelongsTo { foreign_key, .. } => relation
                .target()
                .map(|t| (t, format!("{}.\"id\" = {}.{}", inner, alias, quoted(foreign_key))))
                .into_iter()
                .collect(),
            RelationKind::HasOne { foreign_key, .. } | RelationKind::HasMany { foreign_key, .. } => relation
                .target()
                .map(|t| (t, format!("{}.{} = {}.\"id\"", inner, quoted(foreign_key), alias)))
                .into_iter()
                .collect(),
            RelationKind::MorphMany { morph, owner, .. } => {
                let Some(t) = relation.target() else { return Vec::new() };
                let n = self.buf.push_param(PgBindValue::String(owner.as_str().to_string()));
                vec![(
                    t,
                    format!(
                        "{inner}.{id} = {alias}.\"id\" AND {inner}.{ty} = ${n}::text",
                        inner = inner,
                        alias = alias,
                        id = quoted(&format!("{}_id", morph)),
                        ty = quoted(&format!("{}_type", morph)),
                        n = n
                    ),
                )]
            }
            RelationKind::MorphTo { morph } => OwnerType::ALL
                .iter()
                .map(|owner| {
                    let n = self.buf.push_param(PgBindValue::String(owner.as_str().to_string()));
                    (
                        owner.table(),
                        format!(
                            "{alias}.{ty} = ${n}::text AND {inner}.\"id\" = {alias}.{id}",
                            inner = inner,
                            alias = alias,
                            id = quoted(&format!("{}_id", morph)),
                            ty = quoted(&format!("{}_type", morph)),
                            n = n
                        ),
                    )
                })
                .collect(),
        }
    }

    fn exists(&mut self, alias: &str, relation: &Relation, predicate: &Predicate) -> String {
        let inner = self.next_alias();
        let joins = self.join(alias, &inner, relation);
        let polymorphic = matches!(relation.kind, RelationKind::MorphTo { .. });
        let mut parts = Vec::new();
        for (target, on) in joins {
            // A polymorphic owner table that cannot answer the predicate never matches.
            if polymorphic && check_query(&Query::new(target).filter(predicate.clone())).is_err() {
                continue;
            }
            let mut conds = vec![on];
            conds.extend(Self::trashed_clause(target, &inner, Trashed::Exclude));
            conds.push(self.predicate(target, &inner, predicate));
            parts.push(format!(
                "EXISTS (SELECT 1 FROM {} {} WHERE {})",
                quoted(target.name),
                inner,
                conds.join(" AND ")
            ));
        }
        match parts.len() {
            0 => "FALSE".into(),
            1 => parts.remove(0),
            _ => format!("({})", parts.join(" OR ")),
        }
    }

    fn where_clause(&mut self, query: &Query) -> String {
        let mut conds: Vec<String> = Self::trashed_clause(query.table, "t0", query.trashed).into_iter().collect();
        for p in &query.predicates {
            conds.push(self.predicate(query.table, "t0", p));
        }
        if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        }
    }

    fn order_expr(&mut self, order: &Order) -> String {
        let Some(rel) = order.relation else {
            return format!("t0.{}", quoted(&order.column));
        };
        let inner = self.next_alias();
        let joins = self.join("t0", &inner, rel);
        match joins.into_iter().next() {
            Some((target, on)) => {
                let mut conds = vec![on];
                conds.extend(Self::trashed_clause(target, &inner, Trashed::Exclude));
                format!(
                    "(SELECT {inner}.{col} FROM {t} {inner} WHERE {conds} ORDER BY {inner}.\"id\" LIMIT 1)",
                    inner = inner,
                    col = quoted(&order.column),
                    t = quoted(target.name),
                    conds = conds.join(" AND ")
                )
            }
            None => "NULL".into(),
        }
    }

    fn order_clause(&mut self, query: &Query) -> String {
        if query.order.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{} {}", self.order_expr(o), o.direction.sql()))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }
}

/// SELECT with filters, ordering and window.
pub fn select(query: &Query) -> Result<QueryBuf, StoreError> {
    check_query(query)?;
    let mut c = Compiler::new();
    let where_clause = c.where_clause(query);
    let order_clause = c.order_clause(query);
    let limit_clause = query.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = query.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    c.buf.sql = format!(
        "SELECT {} FROM {} t0{}{}{}{}",
        select_list(query.table, Some("t0")),
        quoted(query.table.name),
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    Ok(c.buf)
}

/// COUNT(*) of the rows a query matches; ordering and window are ignored.
pub fn count(query: &Query) -> Result<QueryBuf, StoreError> {
    check_query(query)?;
    let mut c = Compiler::new();
    let where_clause = c.where_clause(query);
    c.buf.sql = format!("SELECT COUNT(*) FROM {} t0{}", quoted(query.table.name), where_clause);
    Ok(c.buf)
}

/// DELETE every row a query matches.
pub fn delete_where(query: &Query) -> Result<QueryBuf, StoreError> {
    check_query(query)?;
    let mut c = Compiler::new();
    let where_clause = c.where_clause(query);
    c.buf.sql = format!("DELETE FROM {} AS t0{}", quoted(query.table.name), where_clause);
    Ok(c.buf)
}

fn bind_write(buf: &mut QueryBuf, table: &'static Table, column: &str, v: &Value) -> Result<String, StoreError> {
    let ty = table.column_type(column).ok_or_else(|| StoreError::UnknownColumn {
        table: table.name,
        column: column.to_string(),
    })?;
    let b = PgBindValue::for_column(ty, v).ok_or_else(|| StoreError::InvalidValue {
        table: table.name,
        column: column.to_string(),
        value: v.clone(),
    })?;
    Ok(buf.placeholder(ty, b))
}

/// INSERT of prepared values. Omitted columns take their database default.
pub fn insert(table: &'static Table, values: &Map<String, Value>) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::default();
    let mut cols = vec![quoted("created_at"), quoted("updated_at")];
    let mut phs = vec!["NOW()".to_string(), "NOW()".to_string()];
    for (k, v) in values {
        phs.push(bind_write(&mut q, table, k, v)?);
        cols.push(quoted(k));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(table.name),
        cols.join(", "),
        phs.join(", "),
        select_list(table, None)
    );
    Ok(q)
}

/// UPDATE by id of the given columns; `updated_at` is always touched.
pub fn update(table: &'static Table, id: i64, values: &Map<String, Value>) -> Result<QueryBuf, StoreError> {
    let mut q = QueryBuf::default();
    let mut sets = Vec::new();
    for (k, v) in values {
        let ph = bind_write(&mut q, table, k, v)?;
        sets.push(format!("{} = {}", quoted(k), ph));
    }
    sets.push(format!("{} = NOW()", quoted("updated_at")));
    let n = q.push_param(PgBindValue::I64(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE \"id\" = ${}::bigint RETURNING {}",
        quoted(table.name),
        sets.join(", "),
        n,
        select_list(table, None)
    );
    Ok(q)
}

/// Set (`trash = true`) or clear the tombstone of one row.
pub fn set_tombstone(table: &'static Table, id: i64, trash: bool) -> Result<QueryBuf, StoreError> {
    if !table.soft_deletes {
        return Err(StoreError::Unsupported(format!("{} has no tombstone column", table.name)));
    }
    let mut q = QueryBuf::default();
    let n = q.push_param(PgBindValue::I64(id));
    q.sql = format!(
        "UPDATE {} SET \"deleted_at\" = {}, \"updated_at\" = NOW() WHERE \"id\" = ${}::bigint RETURNING {}",
        quoted(table.name),
        if trash { "NOW()" } else { "NULL" },
        n,
        select_list(table, None)
    );
    Ok(q)
}

/// DELETE by id.
pub fn delete(table: &'static Table, id: i64) -> QueryBuf {
    QueryBuf {
        sql: format!("DELETE FROM {} WHERE \"id\" = $1::bigint", quoted(table.name)),
        params: vec![PgBindValue::I64(id)],
    }
}

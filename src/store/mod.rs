//! Persistence collaborator: a backend-neutral query description plus the `Store` trait
//! implemented by PostgreSQL (`PgStore`) and an in-process store (`MemoryStore`).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};

use crate::error::StoreError;
use crate::schema::{Relation, Row, Table};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Soft-delete visibility of a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trashed {
    #[default]
    Exclude,
    Include,
    Only,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Accepts `asc` / `desc` in any case; anything else is None.
    pub fn parse(s: &str) -> Option<Direction> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Direction::Asc),
            "desc" => Some(Direction::Desc),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeAnchor {
    Start,
    End,
    Anywhere,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Mean earth radius used by the radius filter.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

impl GeoPoint {
    /// Parse the `"lat,lng"` text stored in geo columns.
    pub fn parse(s: &str) -> Option<GeoPoint> {
        let (lat, lng) = s.split_once(',')?;
        Some(GeoPoint {
            lat: lat.trim().parse().ok()?,
            lng: lng.trim().parse().ok()?,
        })
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    Compare { column: String, op: CompareOp, value: Value },
    /// Case-insensitive text match; `needle` is literal (no wildcards).
    Like { column: String, needle: String, anchor: LikeAnchor },
    In { column: String, values: Vec<Value>, negated: bool },
    Null { column: String, negated: bool },
    Between { column: String, low: Value, high: Value, negated: bool },
    /// Date portion of the column equals `date`.
    OnDate { column: String, date: NaiveDate },
    /// Date portion of the column within `[from, to]`.
    DateBetween { column: String, from: NaiveDate, to: NaiveDate },
    /// A related row exists that satisfies `predicate`.
    Has { relation: &'static Relation, predicate: Box<Predicate> },
    WithinRadius { column: String, origin: GeoPoint, radius_km: f64 },
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column: column.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column: column.into(),
            op: CompareOp::NotEq,
            value: value.into(),
        }
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Predicate {
        Predicate::In {
            column: column.into(),
            values,
            negated: false,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Predicate {
        Predicate::Null {
            column: column.into(),
            negated: false,
        }
    }

    pub fn not_null(column: impl Into<String>) -> Predicate {
        Predicate::Null {
            column: column.into(),
            negated: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Order {
    pub column: String,
    /// Order by a column of a to-one related row instead of our own.
    pub relation: Option<&'static Relation>,
    pub direction: Direction,
}

/// A query against one table: AND-ed predicates, ordering, window and trashed mode.
#[derive(Clone, Debug)]
pub struct Query {
    pub table: &'static Table,
    pub predicates: Vec<Predicate>,
    pub order: Vec<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub trashed: Trashed,
}

impl Query {
    pub fn new(table: &'static Table) -> Self {
        Query {
            table,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            trashed: Trashed::Exclude,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push(Order {
            column: column.into(),
            relation: None,
            direction,
        });
        self
    }

    pub fn trashed(mut self, trashed: Trashed) -> Self {
        self.trashed = trashed;
        self
    }

    pub fn window(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching the query, ignoring ordering and window.
    async fn count(&self, query: &Query) -> Result<u64, StoreError>;

    async fn fetch(&self, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Insert one row; `created_at` / `updated_at` are set by the store.
    async fn insert(&self, table: &'static Table, data: &Map<String, Value>) -> Result<Row, StoreError>;

    /// Update columns of one row (trashed or not). None when the id does not exist.
    async fn update(&self, table: &'static Table, id: i64, data: &Map<String, Value>) -> Result<Option<Row>, StoreError>;

    /// Set the tombstone. None when the id does not exist.
    async fn soft_delete(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError>;

    /// Clear the tombstone. None when the id does not exist.
    async fn restore(&self, table: &'static Table, id: i64) -> Result<Option<Row>, StoreError>;

    /// Permanently remove one row. False when the id does not exist.
    async fn delete(&self, table: &'static Table, id: i64) -> Result<bool, StoreError>;

    /// Permanently remove every row matching the query's predicates and trashed mode.
    async fn delete_where(&self, query: &Query) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn find(&self, table: &'static Table, id: i64, trashed: Trashed) -> Result<Option<Row>, StoreError> {
        let query = Query::new(table)
            .filter(Predicate::eq("id", id))
            .trashed(trashed)
            .window(1, 0);
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    async fn first(&self, query: Query) -> Result<Option<Row>, StoreError> {
        let query = query.window(1, 0);
        Ok(self.fetch(&query).await?.into_iter().next())
    }
}

/// Validate and coerce a write payload against a table: unknown columns are rejected, values normalized.
pub(crate) fn prepare_write(table: &'static Table, data: &Map<String, Value>) -> Result<Map<String, Value>, StoreError> {
    let mut out = Map::new();
    for (k, v) in data {
        let column = table.column(k).ok_or_else(|| StoreError::UnknownColumn {
            table: table.name,
            column: k.clone(),
        })?;
        let coerced = column.ty.coerce(v).ok_or_else(|| StoreError::InvalidValue {
            table: table.name,
            column: k.clone(),
            value: v.clone(),
        })?;
        out.insert(k.clone(), coerced);
    }
    Ok(out)
}

/// Reject queries naming columns or relations the schema does not declare.
pub(crate) fn check_query(query: &Query) -> Result<(), StoreError> {
    for p in &query.predicates {
        check_predicate(query.table, p)?;
    }
    for o in &query.order {
        let table = match o.relation {
            None => query.table,
            Some(rel) if rel.is_to_one() => rel.target().ok_or_else(|| {
                StoreError::Unsupported(format!("cannot order through polymorphic relation {}", rel.name))
            })?,
            Some(rel) => {
                return Err(StoreError::Unsupported(format!("cannot order through to-many relation {}", rel.name)))
            }
        };
        check_column(table, &o.column)?;
    }
    Ok(())
}

fn check_column(table: &'static Table, column: &str) -> Result<(), StoreError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(StoreError::UnknownColumn {
            table: table.name,
            column: column.to_string(),
        })
    }
}

fn check_predicate(table: &'static Table, predicate: &Predicate) -> Result<(), StoreError> {
    match predicate {
        Predicate::Compare { column, .. }
        | Predicate::Like { column, .. }
        | Predicate::In { column, .. }
        | Predicate::Null { column, .. }
        | Predicate::Between { column, .. }
        | Predicate::OnDate { column, .. }
        | Predicate::DateBetween { column, .. }
        | Predicate::WithinRadius { column, .. } => check_column(table, column),
        Predicate::Has { relation, predicate } => match relation.target() {
            Some(target) => check_predicate(target, predicate),
            // Polymorphic: valid when at least one owner table can answer it.
            None => {
                if crate::schema::OwnerType::ALL
                    .iter()
                    .any(|o| check_predicate(o.table(), predicate).is_ok())
                {
                    Ok(())
                } else {
                    Err(StoreError::Unsupported(format!("no owner of {} matches the predicate", relation.name)))
                }
            }
        },
        Predicate::Any(ps) | Predicate::All(ps) => ps.iter().try_for_each(|p| check_predicate(table, p)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tables;

    #[test]
    fn check_query_rejects_unknown_columns() {
        let q = Query::new(&tables::USERS).filter(Predicate::eq("nope", 1));
        assert!(matches!(check_query(&q), Err(StoreError::UnknownColumn { .. })));
        let role = tables::USERS.relation("role").unwrap();
        let q = Query::new(&tables::USERS).filter(Predicate::Has {
            relation: role,
            predicate: Box::new(Predicate::eq("code", "admin")),
        });
        assert!(check_query(&q).is_ok());
    }

    #[test]
    fn check_query_rejects_to_many_ordering() {
        let mut q = Query::new(&tables::USERS);
        q.order.push(Order {
            column: "title".into(),
            relation: tables::USERS.relation("news"),
            direction: Direction::Asc,
        });
        assert!(matches!(check_query(&q), Err(StoreError::Unsupported(_))));
    }

    #[test]
    fn direction_parsing_is_strict() {
        assert_eq!(Direction::parse("ASC"), Some(Direction::Asc));
        assert_eq!(Direction::parse(" desc "), Some(Direction::Desc));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn haversine_distance() {
        let hanoi = GeoPoint { lat: 21.0285, lng: 105.8542 };
        let hcmc = GeoPoint { lat: 10.8231, lng: 106.6297 };
        let d = hanoi.distance_km(&hcmc);
        assert!((1130.0..1150.0).contains(&d), "got {}", d);
        assert!(hanoi.distance_km(&hanoi) < 1e-9);
    }

    #[test]
    fn geo_text_parsing() {
        assert_eq!(GeoPoint::parse(" 1.5, -2 "), Some(GeoPoint { lat: 1.5, lng: -2.0 }));
        assert_eq!(GeoPoint::parse("nowhere"), None);
    }
}

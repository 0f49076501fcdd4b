//! Request-to-query compilers: search, sort, pagination and their parameter parsing.

pub mod date;
pub mod pagination;
pub mod params;
pub mod search;
pub mod sort;

pub use pagination::{Page, PageRequest, PaginationMeta};
pub use params::{ParamValue, QueryParams};
pub use search::{Condition, FieldSpec};
pub use sort::Sortable;

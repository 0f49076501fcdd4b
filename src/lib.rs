//! Resource API: a configuration-driven REST backend with one generic resource engine for
//! search, sort, pagination, validation, soft deletes and eager loading.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod query;
pub mod resources;
pub mod response;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod transform;

pub use config::{load_resources, resolve, ResolvedModel, ResolvedResource, Settings};
pub use error::{AppError, ConfigError, StoreError};
pub use migration::ensure_schema;
pub use resources::Registry;
pub use response::{message, success_many, success_one, success_one_ok};
pub use routes::{app, common_routes};
pub use seed::seed_defaults;
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, Store};
pub use transform::TransformContext;

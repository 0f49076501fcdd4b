//! Process settings from the environment (`.env` honoured via dotenvy).

use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Absent: the in-memory store is used.
    pub database_url: Option<String>,
    pub bind_addr: String,
    /// Prefix for relative file URLs in responses.
    pub app_url: String,
    pub db_max_connections: u32,
    pub resources_path: Option<String>,
    pub seed_admin_phone: Option<String>,
    pub seed_admin_password: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Validation(format!("DB_MAX_CONNECTIONS must be a positive integer, got {}", v)))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Settings {
            database_url: var("DATABASE_URL"),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            app_url: var("APP_URL").map(|u| u.trim_end_matches('/').to_string()).unwrap_or_default(),
            db_max_connections,
            resources_path: var("RESOURCES_PATH"),
            seed_admin_phone: var("SEED_ADMIN_PHONE"),
            seed_admin_password: var("SEED_ADMIN_PASSWORD"),
        })
    }
}

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::env;
use std::time::Duration;

/// Pool settings. An in-memory SQLite database lives inside a single
/// connection, so that case pins the pool to one connection that never idles out.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub log_sql: bool,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, DbErr> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| DbErr::Custom("DATABASE_URL must be set".to_string()))?;

        let max_connections: u32 = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let min_connections: u32 = env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        Ok(Self {
            url,
            max_connections,
            min_connections: min_connections.min(max_connections),
            log_sql: super::parse_bool_env("DB_LOG_SQL", true),
        })
    }

    pub fn in_memory_sqlite() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            log_sql: false,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.starts_with("sqlite") && self.url.contains(":memory:")
    }
}

pub async fn connect(settings: DatabaseSettings) -> Result<DatabaseConnection, DbErr> {
    let in_memory = settings.is_in_memory();

    let mut opt = ConnectOptions::new(settings.url);
    opt.connect_timeout(Duration::from_secs(5))
        .sqlx_logging(settings.log_sql);

    if in_memory {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .idle_timeout(Duration::from_secs(300));
    }

    Database::connect(opt).await
}

pub async fn get_database() -> Result<DatabaseConnection, DbErr> {
    connect(DatabaseSettings::from_env()?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_in_memory_sqlite() {
        assert!(DatabaseSettings::in_memory_sqlite().is_in_memory());
        let pg = DatabaseSettings {
            url: "postgres://localhost/church".to_string(),
            ..DatabaseSettings::in_memory_sqlite()
        };
        assert!(!pg.is_in_memory());
    }
}

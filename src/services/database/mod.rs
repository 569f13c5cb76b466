// Database access layer: driver capability, scoped leases, and one driver
// per supported backend
pub mod driver;
pub mod lease;
pub mod mysql;
pub mod postgresql;
pub mod registry;
pub mod sqlite;

#[cfg(test)]
pub mod mock;

pub use driver::{ConnectionId, CursorId, Driver, RowStatus};
pub use lease::{ConnectionLease, CursorLease};
pub use mysql::MySQLDriver;
pub use postgresql::PostgreSQLDriver;
pub use sqlite::SqliteDriver;

use crate::api::middleware::AppError;
use crate::config::DatabaseConfig;
use crate::services::dialect::Dialect;
use crate::services::ConnectionPoolManager;
use std::sync::Arc;

/// Database backend enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    PostgreSQL,
    MySQL,
}

impl Backend {
    /// Parse a host driver name (`sqlite3`, `postgres`, `mysql`, ...)
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
            "postgresql" | "postgres" | "pg" => Ok(Backend::PostgreSQL),
            "mysql" | "mariadb" => Ok(Backend::MySQL),
            _ => Err(AppError::Validation(format!("Unsupported database driver: {}", s))),
        }
    }

    /// Infer the backend from a connection URL; bare paths are SQLite files
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split("://").next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "postgresql" | "postgres" => Backend::PostgreSQL,
            "mysql" | "mariadb" => Backend::MySQL,
            _ => Backend::Sqlite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite3",
            Backend::PostgreSQL => "postgres",
            Backend::MySQL => "mysql",
        }
    }

    pub fn dialect(&self) -> Dialect {
        Dialect::from_driver_name(self.as_str())
    }

    /// Column type for opaque values in this backend
    pub fn binary_type(&self) -> &'static str {
        match self {
            Backend::Sqlite => "BLOB",
            Backend::PostgreSQL => "BYTEA",
            Backend::MySQL => "MEDIUMBLOB",
        }
    }
}

/// Factory function to create the driver for the configured backend
pub fn create_driver(
    config: &DatabaseConfig,
    pool_manager: &ConnectionPoolManager,
) -> Result<Arc<dyn Driver>, AppError> {
    let backend = config.backend()?;
    tracing::info!(
        "Creating {} driver for {}",
        backend.as_str(),
        ConnectionPoolManager::mask_credentials(&config.url)
    );

    match backend {
        Backend::Sqlite => Ok(Arc::new(SqliteDriver::new(&config.url)?)),
        Backend::PostgreSQL => {
            let pools = pool_manager.build(&config.url, config.replica_url.as_deref())?;
            Ok(Arc::new(PostgreSQLDriver::new(pools.primary, pools.replica)))
        }
        Backend::MySQL => Ok(Arc::new(MySQLDriver::new(
            &config.url,
            config.replica_url.as_deref(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!(Backend::from_str("postgres").unwrap(), Backend::PostgreSQL);
        assert_eq!(Backend::from_str("MySQL").unwrap(), Backend::MySQL);
        assert_eq!(Backend::from_str("sqlite3").unwrap(), Backend::Sqlite);
        assert!(Backend::from_str("oracle").is_err());
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(Backend::from_url("postgres://u:p@h/db"), Backend::PostgreSQL);
        assert_eq!(Backend::from_url("mariadb://u:p@h/db"), Backend::MySQL);
        assert_eq!(Backend::from_url("sqlite:./kv.db"), Backend::Sqlite);
        assert_eq!(Backend::from_url("./kv.db"), Backend::Sqlite);
    }

    #[test]
    fn test_backend_dialects() {
        assert_eq!(Backend::PostgreSQL.dialect(), Dialect::Numbered);
        assert_eq!(Backend::MySQL.dialect(), Dialect::Positional);
        assert_eq!(Backend::Sqlite.dialect(), Dialect::Positional);
    }

    #[tokio::test]
    async fn test_create_driver_picks_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DatabaseConfig {
            url: format!("sqlite:{}", dir.path().join("kv.db").display()),
            driver_name: None,
            replica_url: None,
            max_pool_size: None,
        };
        let manager = ConnectionPoolManager::with_max_pool_size(2);
        assert_eq!(create_driver(&config, &manager).unwrap().backend(), Backend::Sqlite);

        config.url = "postgresql://user:pw@127.0.0.1:1/mm".into();
        assert_eq!(create_driver(&config, &manager).unwrap().dialect(), Dialect::Numbered);
    }
}

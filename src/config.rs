use serde::Deserialize;
use std::env;

use crate::api::middleware::AppError;
use crate::services::database::Backend;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub command: CommandConfig,
    pub cross_tenant: CrossTenantConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Host driver name (`postgres`, `mysql`, `sqlite3`); inferred from the URL when unset
    pub driver_name: Option<String>,
    /// Read replica, used for listings and lookups when present
    pub replica_url: Option<String>,
    pub max_pool_size: Option<usize>,
}

impl DatabaseConfig {
    pub fn backend(&self) -> Result<Backend, AppError> {
        match self.driver_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Backend::from_str(name),
            _ => Ok(Backend::from_url(&self.url)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub trigger: String,
    pub list_page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossTenantConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("database.url", "sqlite:./kv.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("command.trigger", "kv")?
            .set_default("command.list_page_size", 100)?
            .set_default("cross_tenant.enabled", false)?
            .set_default("logging.level", "info")?;

        // Load from environment variables
        if let Ok(database_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", database_url)?;
        }

        if let Ok(driver) = env::var("DATABASE_DRIVER") {
            builder = builder.set_override("database.driver_name", driver)?;
        }

        if let Ok(replica_url) = env::var("DATABASE_REPLICA_URL") {
            builder = builder.set_override("database.replica_url", replica_url)?;
        }

        if let Ok(size) = env::var("DATABASE_MAX_POOL_SIZE") {
            let size = size
                .parse::<u64>()
                .map_err(|e| config::ConfigError::Message(format!("DATABASE_MAX_POOL_SIZE: {}", e)))?;
            builder = builder.set_override("database.max_pool_size", size)?;
        }

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", parse_port(&port)?)?;
        }

        if let Ok(trigger) = env::var("KV_COMMAND_TRIGGER") {
            builder = builder.set_override("command.trigger", trigger)?;
        }

        if let Ok(enabled) = env::var("KV_CROSS_TENANT_ENABLED") {
            builder = builder.set_override("cross_tenant.enabled", parse_flag(&enabled))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.command.trigger.trim().is_empty() {
            return Err(config::ConfigError::Message("command.trigger cannot be empty".into()));
        }
        if self.command.list_page_size == 0 {
            return Err(config::ConfigError::Message(
                "command.list_page_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_port(value: &str) -> Result<u16, config::ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| config::ConfigError::Message(format!("PORT: {}", e)))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

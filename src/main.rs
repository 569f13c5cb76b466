use axum::Router;
use std::net::SocketAddr;
use tracing::{error, info};

use kv_admin::api::handlers::command::AppState;
use kv_admin::api::routes::create_router_with_state;
use kv_admin::config::Config;
use kv_admin::services::database::create_driver;
use kv_admin::services::{init_schema, ConnectionPoolManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());

    let pool_manager = match config.database.max_pool_size {
        Some(size) => ConnectionPoolManager::with_max_pool_size(size),
        None => ConnectionPoolManager::new(),
    };

    let driver = create_driver(&config.database, &pool_manager).map_err(|e| {
        error!("Failed to initialize database driver: {}", e);
        e
    })?;

    init_schema(driver.as_ref()).await.map_err(|e| {
        error!("Failed to initialize key-value table: {}", e);
        e
    })?;

    if config.cross_tenant.enabled {
        info!("Cross-tenant access enabled");
    }

    // Create router with state
    let app: Router = create_router_with_state(AppState::new(config.clone(), driver));

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

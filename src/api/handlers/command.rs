use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{CommandRequest, CommandResponse};
use crate::services::database::Driver;
use crate::services::{CommandService, CrossTenantReader, SharedTableKvStore};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub driver: Arc<dyn Driver>,
    pub commands: Arc<CommandService>,
    /// Present only when cross-tenant access is enabled
    pub reader: Option<Arc<CrossTenantReader>>,
}

impl AppState {
    pub fn new(config: Config, driver: Arc<dyn Driver>) -> Self {
        let reader = config
            .cross_tenant
            .enabled
            .then(|| Arc::new(CrossTenantReader::new(driver.clone())));

        let mut commands =
            CommandService::new(config.command.trigger.clone(), config.command.list_page_size);
        if let Some(reader) = &reader {
            commands = commands.with_reader(reader.clone());
        }

        Self {
            config,
            driver,
            commands: Arc::new(commands),
            reader,
        }
    }

    pub fn reader(&self) -> Result<&CrossTenantReader, AppError> {
        self.reader
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Cross-tenant access is not enabled".to_string()))
    }
}

/// Run a `/kv` command on behalf of `owner_id`
pub async fn execute_command(
    State(state): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    if payload.owner_id.trim().is_empty() {
        return Err(AppError::Validation("owner_id cannot be empty".to_string()));
    }
    if payload.command.trim().is_empty() {
        return Err(AppError::Validation("command cannot be empty".to_string()));
    }

    let kv = SharedTableKvStore::for_owner(state.driver.clone(), payload.owner_id)?;
    let response = state.commands.execute(&kv, &payload.command).await?;

    Ok(Json(response))
}

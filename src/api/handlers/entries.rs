use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::handlers::command::AppState;
use crate::api::middleware::AppError;
use crate::models::{EntryResponse, ListAllResponse};
use crate::services::group_by_owner;

/// List every owner's keys, grouped by owner
pub async fn list_entries(State(state): State<AppState>) -> Result<Json<ListAllResponse>, AppError> {
    let entries = state.reader()?.list_all().await?;

    Ok(Json(ListAllResponse {
        total_keys: entries.len(),
        owners: group_by_owner(&entries),
    }))
}

/// Fetch one entry from any owner's namespace
pub async fn get_entry(
    State(state): State<AppState>,
    Path((owner_id, key)): Path<(String, String)>,
) -> Result<Json<EntryResponse>, AppError> {
    let entry = state.reader()?.lookup(&owner_id, &key).await?;
    Ok(Json(EntryResponse::from(entry)))
}

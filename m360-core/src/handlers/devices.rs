use crate::error::AppResult;
use crate::models::Device;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateDevice {
    pub client_name: String,
    pub ip: String,
    pub mac: Option<String>,
    pub node: Option<String>,
    pub credential_id: Option<i64>,
    pub is_maestro: Option<bool>,
    pub vpn_profile_id: Option<i64>,
}

pub async fn list(State(state): State<Arc<AppState>>, Path(owner): Path<String>) -> AppResult<Json<Vec<Device>>> {
    Ok(Json(state.db.list_devices(&owner).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateDevice>,
) -> AppResult<Json<Device>> {
    let device = state
        .db
        .insert_device(
            &owner,
            &payload.client_name,
            &payload.ip,
            payload.mac.as_deref(),
            payload.node.as_deref(),
            payload.credential_id,
            payload.is_maestro.unwrap_or(false),
            payload.vpn_profile_id,
        )
        .await?;
    state.db.insert_monitor(&device.id, &owner).await?;
    Ok(Json(device))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, String)>,
) -> AppResult<Json<bool>> {
    Ok(Json(state.db.delete_device(&id).await?))
}

use crate::error::AppResult;
use crate::models::{Credential, NotificationChannel, VpnProfile};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateCredential {
    pub name: String,
    pub username: String,
    pub password: String,
}

pub async fn list_credentials(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> AppResult<Json<Vec<Credential>>> {
    Ok(Json(state.db.list_credentials(&owner).await?))
}

pub async fn create_credential(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateCredential>,
) -> AppResult<Json<Credential>> {
    Ok(Json(
        state
            .db
            .insert_credential(&owner, &payload.name, &payload.username, &payload.password)
            .await?,
    ))
}

pub async fn delete_credential(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, i64)>,
) -> AppResult<Json<bool>> {
    Ok(Json(state.db.delete_credential(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateVpnProfile {
    pub name: String,
    pub config_text: String,
    pub check_ip: Option<String>,
    pub is_default: Option<bool>,
}

pub async fn list_vpn_profiles(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> AppResult<Json<Vec<VpnProfile>>> {
    Ok(Json(state.db.list_vpn_profiles(&owner).await?))
}

pub async fn create_vpn_profile(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateVpnProfile>,
) -> AppResult<Json<VpnProfile>> {
    Ok(Json(
        state
            .db
            .insert_vpn_profile(
                &owner,
                &payload.name,
                &payload.config_text,
                payload.check_ip.as_deref(),
                payload.is_default.unwrap_or(false),
            )
            .await?,
    ))
}

pub async fn delete_vpn_profile(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, i64)>,
) -> AppResult<Json<bool>> {
    Ok(Json(state.db.delete_vpn_profile(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateChannel {
    pub name: String,
    pub kind: String,
    pub config: serde_json::Value,
}

pub async fn list_channels(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> AppResult<Json<Vec<NotificationChannel>>> {
    Ok(Json(state.db.list_channels(&owner).await?))
}

pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateChannel>,
) -> AppResult<Json<NotificationChannel>> {
    let config = serde_json::to_string(&payload.config)
        .map_err(|e| crate::error::AppError::BadRequest(e.to_string()))?;
    Ok(Json(
        state
            .db
            .insert_channel(&owner, &payload.name, &payload.kind, &config)
            .await?,
    ))
}

pub async fn delete_channel(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, i64)>,
) -> AppResult<Json<bool>> {
    Ok(Json(state.db.delete_channel(id).await?))
}

use crate::error::{AppError, AppResult};
use crate::models::Sensor;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateSensor {
    pub device_id: String,
    pub kind: String,
    pub name: String,
    pub config: serde_json::Value,
}

pub async fn list(State(state): State<Arc<AppState>>, Path(owner): Path<String>) -> AppResult<Json<Vec<Sensor>>> {
    Ok(Json(state.db.list_sensors(&owner).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
    Json(payload): Json<CreateSensor>,
) -> AppResult<Json<Sensor>> {
    let monitor = state
        .db
        .get_monitor_by_device(&payload.device_id)
        .await?
        .ok_or_else(|| AppError::BadRequest("device has no monitor".to_string()))?;

    let config = serde_json::to_string(&payload.config)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let sensor = state
        .db
        .insert_sensor(monitor.id, &owner, &payload.kind, &payload.name, &config)
        .await?;

    state.scheduler.launch(sensor.id).await;
    Ok(Json(sensor))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, i64)>,
) -> AppResult<Json<bool>> {
    state.scheduler.stop(id);
    Ok(Json(state.db.delete_sensor(id).await?))
}

pub async fn restart(
    State(state): State<Arc<AppState>>,
    Path((_owner, id)): Path<(String, i64)>,
) -> AppResult<Json<bool>> {
    state.scheduler.restart(id).await;
    Ok(Json(true))
}

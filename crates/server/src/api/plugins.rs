//! Plugin management endpoints, delegating to the registry.

use axum::Json;
use axum::extract::{Path, State};

use super::AppState;
use crate::error::ApiError;

/// `GET /plugins`
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let plugins = state.registry.list().await;
    Json(serde_json::json!({
        "count": plugins.len(),
        "plugins": plugins,
    }))
}

/// `GET /plugins/{name}`
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let info = state
        .registry
        .get(&name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("plugin {name} not found")))?;
    Ok(Json(serde_json::to_value(info).map_err(|e| ApiError::Internal(Box::new(e)))?))
}

/// `POST /plugins/{name}/enable`
pub async fn enable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.registry.get(&name).await.is_none() {
        return Err(ApiError::NotFound(format!("plugin {name} not found")));
    }
    if state.registry.enable(&name).await {
        Ok(Json(serde_json::json!({ "status": "enabled", "plugin": name })))
    } else {
        Err(ApiError::Validation(format!("failed to enable plugin {name}")))
    }
}

/// `POST /plugins/{name}/disable`
pub async fn disable(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.registry.get(&name).await.is_none() {
        return Err(ApiError::NotFound(format!("plugin {name} not found")));
    }
    if state.registry.disable(&name).await {
        Ok(Json(serde_json::json!({ "status": "disabled", "plugin": name })))
    } else {
        Err(ApiError::Validation(format!("failed to disable plugin {name}")))
    }
}

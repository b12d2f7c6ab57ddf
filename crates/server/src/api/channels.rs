//! Event bus endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

/// `GET /channels`
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let channels: Vec<serde_json::Value> = state
        .core
        .bus
        .list_channels()
        .into_iter()
        .map(|name| {
            let subscribers = state.core.bus.subscriber_count(&name);
            serde_json::json!({ "name": name, "subscribers": subscribers })
        })
        .collect();
    Json(serde_json::json!({
        "count": channels.len(),
        "channels": channels,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

/// `GET /channels/{channel}/history?limit=N`
pub async fn history(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = state.core.bus.history(&channel, query.limit);
    Ok(Json(serde_json::json!({
        "channel": channel,
        "count": messages.len(),
        "messages": messages,
    })))
}

/// `POST /channels/{channel}/publish` - publish the request body as message
/// data, with the API as the sender.
pub async fn publish(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Option<Json<serde_json::Value>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let data = body.map_or(serde_json::Value::Null, |Json(value)| value);
    state.core.bus.publish(&channel, data, Some("api"));
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "status": "published", "channel": channel })),
    ))
}

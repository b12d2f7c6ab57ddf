use axum::Json;
use axum::extract::State;
use axum::response::Html;
use chrono::Utc;

use super::AppState;
use crate::error::ApiError;

const LANDING_PAGE: &str = r"<!DOCTYPE html>
<html>
<head>
    <meta charset='utf-8'>
    <title>holod</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 640px; margin: 80px auto; color: #333;
        }
        code { background: #f4f4f4; padding: 2px 6px; border-radius: 3px; }
    </style>
</head>
<body>
    <h1>holod</h1>
    <p>The Holocene daemon is running.</p>
    <p>Status: <code>GET /status</code> &middot; Health: <code>GET /health</code></p>
</body>
</html>
";

/// `GET /` - small HTML landing page.
pub async fn root() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

/// `GET /health` - liveness plus a database connectivity probe.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = match state.core.store.ping().await {
        Ok(()) => "ok",
        Err(_) => "error",
    };
    Json(serde_json::json!({
        "status": "ok",
        "database": database,
    }))
}

/// `GET /status` - daemon status summary.
pub async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let plugins = state.registry.list().await;
    let uptime = (Utc::now() - state.started_at).num_seconds();

    Ok(Json(serde_json::json!({
        "running": true,
        "device": state.registry.device(),
        "plugins": plugins.len(),
        "uptime_seconds": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

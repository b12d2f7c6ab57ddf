//! Magic-link login, session status, and logout.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use crate::auth::{AuthService, session_from_cookie_header};
use crate::error::ApiError;

const SUCCESS_PAGE: &str = r"<!DOCTYPE html>
<html>
<head>
    <meta charset='utf-8'>
    <title>Logged in</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            max-width: 480px; margin: 80px auto; text-align: center; color: #333;
        }
    </style>
</head>
<body>
    <h1>You're in</h1>
    <p>Login successful. You can close this tab and return to the app.</p>
</body>
</html>
";

const PREVIEW_PAGE: &str = r"<!DOCTYPE html>
<html>
<head><meta charset='utf-8'><title>Login link</title></head>
<body><p>Open this link in your browser to log in.</p></body>
</html>
";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    token: Option<String>,
}

/// `GET /auth/login?token=...` - consume a magic link and open a session.
///
/// Link-preview bots get a static page without touching the token, so a
/// messenger rendering the link cannot burn it.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(token) = query.token else {
        return Err(ApiError::Validation("missing token parameter".into()));
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if AuthService::is_preview_bot(user_agent) {
        debug!(user_agent, "ignoring link preview bot");
        return Ok(Html(PREVIEW_PAGE).into_response());
    }

    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_owned());

    let Some((_user_id, cookie_value)) = state
        .auth
        .login_with_token(
            &token,
            Utc::now(),
            forwarded_for.as_deref(),
            Some(user_agent),
        )
        .await?
    else {
        return Err(ApiError::Unauthorized("invalid or expired token".into()));
    };

    let mut response = Html(SUCCESS_PAGE).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        AuthService::session_cookie(&cookie_value)
            .parse()
            .map_err(|e| ApiError::Internal(Box::new(e)))?,
    );
    Ok(response)
}

/// `GET /auth/status` - whether the caller holds a valid session.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let user_id = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_from_cookie_header)
        .and_then(|value| state.auth.verify_session(value, Utc::now()));

    match user_id {
        Some(user_id) => Json(serde_json::json!({
            "authenticated": true,
            "user_id": user_id,
        })),
        None => Json(serde_json::json!({ "authenticated": false })),
    }
}

/// `POST /auth/logout` - clear the session cookie.
pub async fn logout() -> Result<Response, ApiError> {
    let mut response = (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "logged_out" })),
    )
        .into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        AuthService::clear_session_cookie()
            .parse()
            .map_err(|e| ApiError::Internal(Box::new(e)))?,
    );
    Ok(response)
}

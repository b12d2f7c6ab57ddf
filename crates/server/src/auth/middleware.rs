//! Authentication middleware: accepts a bearer token or a signed session
//! cookie; everything else is 401.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::debug;

use crate::api::AppState;
use crate::auth::{AuthMethod, AuthUser, session_from_cookie_header};
use crate::error::ApiError;

/// Require a valid credential. On success the request gains an [`AuthUser`]
/// extension for downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Bearer first: explicit credentials win over ambient cookies.
    if let Some(token) = bearer_token(&request) {
        let token = token.to_owned();
        if let Some(api_token) = state.auth.validate_bearer(&token).await? {
            debug!(user_id = api_token.user_id, "authenticated via bearer token");
            request.extensions_mut().insert(AuthUser {
                user_id: api_token.user_id,
                method: AuthMethod::Bearer,
            });
            return Ok(next.run(request).await);
        }
        return Err(ApiError::Unauthorized("invalid or revoked token".into()));
    }

    if let Some(user_id) = session_user(&state, &request) {
        debug!(user_id, "authenticated via session cookie");
        request.extensions_mut().insert(AuthUser {
            user_id,
            method: AuthMethod::Session,
        });
        return Ok(next.run(request).await);
    }

    Err(ApiError::Unauthorized("authentication required".into()))
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn session_user(state: &AppState, request: &Request) -> Option<i64> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    let value = session_from_cookie_header(cookies)?;
    state.auth.verify_session(value, Utc::now())
}

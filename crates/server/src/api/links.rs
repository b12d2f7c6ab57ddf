//! Link collection endpoints and the archive trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use holocene_archive::{ArchiveOptions, LocalFormat};

use super::{AppState, Pagination};
use crate::error::ApiError;

/// `GET /links?limit=N&offset=M`
pub async fn list(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let links = state.core.store.list_links(page.limit, page.offset).await?;
    Ok(Json(serde_json::json!({
        "count": links.len(),
        "limit": page.limit,
        "offset": page.offset,
        "links": links,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateLink {
    url: String,
    title: Option<String>,
    source: Option<String>,
}

/// `POST /links` - store a link (canonicalized) and publish `links.added`.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateLink>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let source = body.source.as_deref().unwrap_or("api");
    let outcome = state
        .core
        .store
        .upsert_link(&body.url, source, body.title.as_deref())
        .await
        .map_err(|e| match e {
            holocene_store::StoreError::Decode(inner) => ApiError::Validation(inner.to_string()),
            other => other.into(),
        })?;

    let link = state
        .core
        .store
        .get_link(outcome.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("link vanished after insert".into()))?;

    state.core.bus.publish(
        "links.added",
        serde_json::json!({
            "link_id": link.id,
            "url": link.url,
            "title": link.title,
        }),
        Some("api"),
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "created",
            "link_id": link.id,
            "url": link.url,
            "was_new": outcome.was_new,
        })),
    ))
}

/// `GET /links/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let link = state
        .core
        .store
        .get_link(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("link {id} not found")))?;
    Ok(Json(serde_json::to_value(link).map_err(|e| ApiError::Internal(Box::new(e)))?))
}

/// `GET /links/{id}/snapshots` - all archive attempts for a link, newest
/// first.
pub async fn snapshots(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.core.store.get_link(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("link {id} not found")));
    }
    let snapshots = state.core.store.snapshots_for_link(id).await?;
    Ok(Json(serde_json::json!({
        "link_id": id,
        "count": snapshots.len(),
        "snapshots": snapshots,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveRequest {
    /// "monolith", "warc", or "none"; absent uses the daemon default.
    local_format: Option<String>,
    use_ia: Option<bool>,
    force_ia: bool,
    use_archivebox: Option<bool>,
    force_archivebox: bool,
    /// Hand the work to the background runner and return immediately.
    background: bool,
}

/// `POST /links/{id}/archive` - run the archiving pipeline for one link,
/// inline or on the background runner.
pub async fn archive(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ArchiveRequest>>,
) -> Result<Response, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let link = state
        .core
        .store
        .get_link(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("link {id} not found")))?;

    let defaults = ArchiveOptions::default();
    let local_format = match request.local_format.as_deref() {
        None => defaults.local_format,
        Some("monolith") => Some(LocalFormat::Monolith),
        Some("warc") => Some(LocalFormat::Warc),
        Some("none") => None,
        Some(other) => {
            return Err(ApiError::Validation(format!(
                "unknown local format: {other}"
            )));
        }
    };

    let options = ArchiveOptions {
        local_format,
        use_ia: request.use_ia.unwrap_or(defaults.use_ia),
        force_ia: request.force_ia,
        use_archivebox: request.use_archivebox.unwrap_or(defaults.use_archivebox),
        force_archivebox: request.force_archivebox,
    };

    if request.background {
        let archiver = Arc::clone(&state.archiver);
        let url = link.url.clone();
        let link_id = link.id;
        state
            .core
            .runner
            .submit(
                async move {
                    archiver
                        .archive_url(link_id, &url, options)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                },
                None,
                None,
            )
            .await
            .map_err(|e| ApiError::Internal(Box::new(e)))?;

        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "scheduled", "link_id": link_id })),
        )
            .into_response());
    }

    let result = state.archiver.archive_url(link.id, &link.url, options).await?;
    Ok(Json(result).into_response())
}

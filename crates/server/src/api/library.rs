//! Book and paper collection endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::{AppState, Pagination};
use crate::error::ApiError;

/// `GET /books`
pub async fn list_books(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let books = state.core.store.list_books(page.limit, page.offset).await?;
    Ok(Json(serde_json::json!({
        "count": books.len(),
        "limit": page.limit,
        "offset": page.offset,
        "books": books,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateBook {
    title: String,
    author: String,
    publication_year: Option<i64>,
    isbn: Option<String>,
}

/// `POST /books` - add a book and publish `books.added`.
pub async fn create_book(
    State(state): State<AppState>,
    Json(body): Json<CreateBook>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if body.title.trim().is_empty() || body.author.trim().is_empty() {
        return Err(ApiError::Validation("title and author are required".into()));
    }

    let outcome = state
        .core
        .store
        .upsert_book(
            &body.title,
            &body.author,
            body.publication_year,
            body.isbn.as_deref(),
        )
        .await?;

    state.core.bus.publish(
        "books.added",
        serde_json::json!({
            "book_id": outcome.id,
            "title": body.title,
            "author": body.author,
        }),
        Some("api"),
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "created",
            "book_id": outcome.id,
            "was_new": outcome.was_new,
        })),
    ))
}

/// `GET /books/{id}`
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let book = state
        .core
        .store
        .get_book(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("book {id} not found")))?;
    Ok(Json(serde_json::to_value(book).map_err(|e| ApiError::Internal(Box::new(e)))?))
}

/// `GET /papers`
pub async fn list_papers(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let papers = state.core.store.list_papers(page.limit, page.offset).await?;
    Ok(Json(serde_json::json!({
        "count": papers.len(),
        "limit": page.limit,
        "offset": page.offset,
        "papers": papers,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreatePaper {
    title: String,
    first_author: Option<String>,
    year: Option<i64>,
    doi: Option<String>,
}

/// `POST /papers` - add a paper and publish `papers.added`.
pub async fn create_paper(
    State(state): State<AppState>,
    Json(body): Json<CreatePaper>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }

    let outcome = state
        .core
        .store
        .upsert_paper(
            &body.title,
            body.first_author.as_deref(),
            body.year,
            body.doi.as_deref(),
        )
        .await?;

    state.core.bus.publish(
        "papers.added",
        serde_json::json!({
            "paper_id": outcome.id,
            "title": body.title,
            "doi": body.doi,
        }),
        Some("api"),
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "created",
            "paper_id": outcome.id,
            "was_new": outcome.was_new,
        })),
    ))
}

/// `GET /papers/{id}`
pub async fn get_paper(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let paper = state
        .core
        .store
        .get_paper(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("paper {id} not found")))?;
    Ok(Json(serde_json::to_value(paper).map_err(|e| ApiError::Internal(Box::new(e)))?))
}

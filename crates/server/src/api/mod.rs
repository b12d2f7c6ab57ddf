pub mod auth;
pub mod channels;
pub mod health;
pub mod library;
pub mod links;
pub mod plugins;
pub mod viewer;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use holocene_archive::ArchivingService;
use holocene_runtime::{Core, PluginRegistry};

use crate::auth::AuthService;
use crate::auth::middleware::require_auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<Core>,
    pub registry: Arc<PluginRegistry>,
    pub archiver: Arc<ArchivingService>,
    pub auth: Arc<AuthService>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[must_use]
    pub fn new(
        core: Arc<Core>,
        registry: Arc<PluginRegistry>,
        archiver: Arc<ArchivingService>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            core,
            registry,
            archiver,
            auth,
            started_at: Utc::now(),
        }
    }
}

/// Pagination query parameters shared by the collection endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "Pagination::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Pagination {
    const fn default_limit() -> i64 {
        100
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}

/// Build the router: status and auth entry points are public, everything
/// else sits behind the auth middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/status", get(health::status))
        .route("/auth/login", get(auth::login))
        .route("/auth/status", get(auth::status))
        .route("/auth/logout", post(auth::logout));

    let protected = Router::new()
        .route("/plugins", get(plugins::list))
        .route("/plugins/{name}", get(plugins::get))
        .route("/plugins/{name}/enable", post(plugins::enable))
        .route("/plugins/{name}/disable", post(plugins::disable))
        .route("/channels", get(channels::list))
        .route("/channels/{channel}/history", get(channels::history))
        .route("/channels/{channel}/publish", post(channels::publish))
        .route("/links", get(links::list).post(links::create))
        .route("/links/{id}", get(links::get))
        .route("/links/{id}/snapshots", get(links::snapshots))
        .route("/links/{id}/archive", post(links::archive))
        .route("/books", get(library::list_books).post(library::create_book))
        .route("/books/{id}", get(library::get_book))
        .route(
            "/papers",
            get(library::list_papers).post(library::create_paper),
        )
        .route("/papers/{id}", get(library::get_paper))
        .route("/mono/{link_id}", get(viewer::mono_latest))
        .route("/mono/{link_id}/latest", get(viewer::mono_latest))
        .route("/mono/{link_id}/first", get(viewer::mono_first))
        .route("/mono/{link_id}/{index}", get(viewer::mono_index))
        .route("/snapshot/{id}", get(viewer::snapshot))
        .route("/box/{snapshot_id}", get(viewer::archivebox))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

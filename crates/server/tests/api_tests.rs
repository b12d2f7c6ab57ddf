use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use tower::ServiceExt;

use holocene_archive::{
    ArchivingService, LocalFormat, ProviderError, SaveOutcome, SavePageClient, SaveStatus,
    SnapshotOutcome, Snapshotter,
};
use holocene_core::archive_filename;
use holocene_runtime::{Config, Core, Plugin, PluginContext, PluginError, PluginMetadata,
    PluginRegistry};
use holocene_server::AuthService;
use holocene_server::api::{AppState, router};
use holocene_store::Store;

// -- Mock providers -------------------------------------------------------

/// Snapshotter that writes a real file under the archive root, so the
/// viewer endpoints can serve it back.
struct WritingSnapshotter {
    root: PathBuf,
    fail: bool,
}

#[async_trait]
impl Snapshotter for WritingSnapshotter {
    async fn snapshot(
        &self,
        url: &str,
        format: LocalFormat,
        _timeout: Duration,
    ) -> Result<SnapshotOutcome, ProviderError> {
        if self.fail {
            return Err(ProviderError::ExecutionFailed("mock snapshot failure".into()));
        }
        let dir = self.root.join(format.subdir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProviderError::ExecutionFailed(e.to_string()))?;
        let path = dir.join(archive_filename(url, format.extension(), Utc::now()));
        let contents = "<html><head><meta http-equiv=\"Content-Security-Policy\" \
            content=\"default-src 'none'\"><title>archived</title></head>\
            <body>archived page</body></html>";
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ProviderError::ExecutionFailed(e.to_string()))?;
        Ok(SnapshotOutcome {
            path,
            file_size: contents.len() as u64,
            archive_date: Utc::now(),
        })
    }
}

struct MockSaveClient {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl SavePageClient for MockSaveClient {
    async fn save_url(
        &self,
        url: &str,
        _force: bool,
        _timeout: Duration,
    ) -> Result<SaveOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Upstream {
                status: 503,
                message: "save endpoint unavailable".into(),
            });
        }
        Ok(SaveOutcome {
            status: SaveStatus::Archived,
            snapshot_url: format!("https://web.archive.org/web/20240301093000/{url}"),
            archive_date: Some(Utc::now()),
        })
    }
}

/// Minimal plugin so the plugin endpoints have something to manage.
struct TogglePlugin;

#[async_trait]
impl Plugin for TogglePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "test_toggle",
            version: "1.0.0",
            description: "no-op plugin for api tests",
            runs_on: &["*"],
            requires: &[],
        }
    }

    async fn on_enable(&self, _ctx: &Arc<PluginContext>) -> Result<(), PluginError> {
        Ok(())
    }
}

// -- Helpers --------------------------------------------------------------

struct TestHarness {
    app: axum::Router,
    state: AppState,
    bearer: String,
}

async fn harness() -> TestHarness {
    harness_with(false, false).await
}

async fn harness_with(snapshot_fail: bool, save_fail: bool) -> TestHarness {
    let scratch = std::env::temp_dir()
        .join("holocene-api-tests")
        .join(format!("run-{}", rand_suffix()));
    let archive_root = scratch.join("archives");
    tokio::fs::create_dir_all(&archive_root).await.unwrap();

    let mut config = Config::default();
    config.data_dir = scratch;

    let store = Store::open_in_memory().await.unwrap();
    let core = Core::with_store(config, store.clone());

    let registry = PluginRegistry::new(
        Arc::clone(&core),
        "server",
        vec![Arc::new(TogglePlugin) as Arc<dyn Plugin>],
    );
    core.set_registry(&registry);
    registry.load_all().await;
    registry.enable_all().await;

    let archiver = Arc::new(ArchivingService::new(
        store.clone(),
        Arc::new(WritingSnapshotter {
            root: archive_root,
            fail: snapshot_fail,
        }),
        Some(Arc::new(MockSaveClient {
            fail: save_fail,
            calls: AtomicUsize::new(0),
        }) as Arc<dyn SavePageClient>),
        None,
        10,
        Duration::from_secs(5),
    ));

    let auth = Arc::new(
        AuthService::bootstrap(store.clone(), "http://localhost:5555".to_owned())
            .await
            .unwrap(),
    );

    let user = store.get_or_create_user(1001, Some("tester")).await.unwrap();
    let bearer = format!("hlc_{}", AuthService::generate_token());
    store
        .create_api_token(user.id, &bearer, "api-tests")
        .await
        .unwrap();

    let state = AppState::new(core, registry, archiver, auth);
    let app = router(state.clone());
    TestHarness { app, state, bearer }
}

fn rand_suffix() -> u64 {
    rand::random()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed_get(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, bearer: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// -- Status & auth gate ---------------------------------------------------

#[tokio::test]
async fn health_and_status_are_public() {
    let h = harness().await;

    let response = h.app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "ok");

    let response = h.app.clone().oneshot(get("/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["running"], true);
    assert_eq!(json["device"], "server");
    assert_eq!(json["plugins"], 1);

    let response = h.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("holod"));
}

#[tokio::test]
async fn protected_routes_require_credentials() {
    let h = harness().await;

    let response = h.app.clone().oneshot(get("/links")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["error"].is_string());

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links", "hlc_not_a_real_token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links", &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn revoked_bearer_is_rejected() {
    let h = harness().await;
    h.state
        .core
        .store
        .revoke_api_token(&h.bearer)
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links", &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// -- Links ----------------------------------------------------------------

#[tokio::test]
async fn link_ingest_canonicalizes_and_publishes() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/links",
            &h.bearer,
            &serde_json::json!({"url": "https://example.com/a?utm_source=x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "created");
    assert_eq!(json["url"], "https://example.com/a");
    assert_eq!(json["was_new"], true);
    let link_id = json["link_id"].as_i64().unwrap();

    // Same canonical URL -> same row.
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/links",
            &h.bearer,
            &serde_json::json!({"url": "https://example.com/a"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["link_id"].as_i64().unwrap(), link_id);
    assert_eq!(json["was_new"], false);

    // The ingest published links.added.
    let response = h
        .app
        .clone()
        .oneshot(authed_get("/channels/links.added/history", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"].as_u64(), Some(2));
    assert_eq!(json["messages"][0]["data"]["link_id"].as_i64(), Some(link_id));
    assert_eq!(json["messages"][0]["sender"], "api");
}

#[tokio::test]
async fn invalid_url_is_a_validation_error() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/links",
            &h.bearer,
            &serde_json::json!({"url": "not a url"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn link_pagination() {
    let h = harness().await;
    for i in 0..5 {
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                "/links",
                &h.bearer,
                &serde_json::json!({"url": format!("https://example.com/p{i}")}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links?limit=2&offset=0", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"].as_u64(), Some(2));
    assert_eq!(json["limit"].as_i64(), Some(2));

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links?limit=100&offset=4", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"].as_u64(), Some(1));
}

#[tokio::test]
async fn missing_link_is_404() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(authed_get("/links/9999", &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Archiving ------------------------------------------------------------

async fn ingest_link(h: &TestHarness, url: &str) -> i64 {
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/links",
            &h.bearer,
            &serde_json::json!({"url": url}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["link_id"].as_i64().unwrap()
}

#[tokio::test]
async fn archive_end_to_end_with_viewer() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/article").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/links/{link_id}/archive"),
            &h.bearer,
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["services"]["local_monolith"]["status"], "success");
    assert_eq!(json["services"]["internet_archive"]["status"], "success");

    // The artifact landed under archives/monolith with the expected name.
    let path = json["services"]["local_monolith"]["snapshot_url"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(path.contains("/archives/monolith/"));
    let name = path.rsplit('/').next().unwrap();
    assert!(name.starts_with("example.com_"));
    assert!(name.ends_with(".html"));

    // The viewer serves it with the CSP meta stripped and a header set.
    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/mono/{link_id}"), &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_SECURITY_POLICY)
            .is_some()
    );
    let html = body_text(response).await;
    assert!(html.contains("archived page"));
    assert!(!html.contains("http-equiv"));

    // The link row mirrors the IA success.
    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/links/{link_id}"), &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["archived"], true);
    assert_eq!(json["archive_attempts"].as_i64(), Some(0));
}

#[tokio::test]
async fn ia_dedup_on_second_archive_call() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/article").await;

    let first = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/links/{link_id}/archive"),
            &h.bearer,
            &serde_json::json!({"local_format": "none"}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(first).await["services"]["internet_archive"]["status"], "success");

    let snapshots = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/links/{link_id}/snapshots"), &h.bearer))
        .await
        .unwrap();
    let count_before = body_json(snapshots).await["count"].as_u64().unwrap();

    let second = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/links/{link_id}/archive"),
            &h.bearer,
            &serde_json::json!({"local_format": "none"}),
        ))
        .await
        .unwrap();
    let json = body_json(second).await;
    assert_eq!(
        json["services"]["internet_archive"]["status"],
        "already_archived"
    );
    assert_eq!(json["success"], true);

    // No new snapshot row was created by the dedup path.
    let snapshots = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/links/{link_id}/snapshots"), &h.bearer))
        .await
        .unwrap();
    assert_eq!(
        body_json(snapshots).await["count"].as_u64().unwrap(),
        count_before
    );
}

#[tokio::test]
async fn backoff_ladder_accumulates_attempts() {
    let h = harness_with(true, true).await;
    let link_id = ingest_link(&h, "https://example.com/flaky").await;

    for expected in 1..=3_i64 {
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                &format!("/links/{link_id}/archive"),
                &h.bearer,
                &serde_json::json!({"force_ia": true}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(
            json["services"]["local_monolith"]["attempts"].as_i64(),
            Some(expected)
        );
        assert_eq!(
            json["services"]["internet_archive"]["attempts"].as_i64(),
            Some(expected)
        );
    }

    // Retry deadlines follow the doubling ladder (~1, 2, 4 days +-10%).
    let snapshots = h
        .state
        .core
        .store
        .snapshots_for_link(link_id)
        .await
        .unwrap();
    let mut ia_rows: Vec<_> = snapshots
        .iter()
        .filter(|s| s.service == holocene_core::ArchiveService::InternetArchive)
        .collect();
    ia_rows.reverse();
    assert_eq!(ia_rows.len(), 3);
    for (index, row) in ia_rows.iter().enumerate() {
        let attempts = i64::try_from(index).unwrap() + 1;
        assert_eq!(row.attempts, attempts);
        let delta = (row.next_retry_after.unwrap() - row.created_at).num_seconds();
        let base = 86_400 * 2_i64.pow(u32::try_from(index).unwrap());
        assert!(
            delta >= base * 9 / 10 && delta <= base * 11 / 10,
            "row {index}: delta {delta} outside ladder window {base}"
        );
    }
}

#[tokio::test]
async fn background_archive_is_accepted_and_runs() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/deferred").await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            &format!("/links/{link_id}/archive"),
            &h.bearer,
            &serde_json::json!({"background": true, "use_ia": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "scheduled");

    // The runner picks the task up shortly after.
    let mut snapshots = Vec::new();
    for _ in 0..50 {
        snapshots = h
            .state
            .core
            .store
            .snapshots_for_link(link_id)
            .await
            .unwrap();
        if !snapshots.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(snapshots.len(), 1);
    assert_eq!(
        snapshots[0].service,
        holocene_core::ArchiveService::LocalMonolith
    );
}

// -- Magic links ----------------------------------------------------------

#[tokio::test]
async fn magic_link_is_single_use() {
    let h = harness().await;
    let user = h
        .state
        .core
        .store
        .get_or_create_user(2002, None)
        .await
        .unwrap();
    let link = h.state.auth.issue_magic_link(user.id).await.unwrap();
    let token = link.split("token=").nth(1).unwrap();

    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/auth/login?token={token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie_header = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(cookie_header.starts_with("holocene_session="));

    // The session cookie authenticates protected routes.
    let cookie_value = cookie_header.split(';').next().unwrap().to_owned();
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/links")
                .header(header::COOKIE, &cookie_value)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second use of the same token fails.
    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/auth/login?token={token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn preview_bot_does_not_burn_token() {
    let h = harness().await;
    let user = h
        .state
        .core
        .store
        .get_or_create_user(2002, None)
        .await
        .unwrap();
    let link = h.state.auth.issue_magic_link(user.id).await.unwrap();
    let token = link.split("token=").nth(1).unwrap().to_owned();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/login?token={token}"))
                .header(header::USER_AGENT, "TelegramBot (like TwitterBot)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let row = h
        .state
        .core
        .store
        .get_auth_token(&token)
        .await
        .unwrap()
        .unwrap();
    assert!(row.used_at.is_none(), "preview fetch must not consume the token");

    // A real browser can still log in afterwards.
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/auth/login?token={token}"))
                .header(header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let h = harness().await;
    let user = h
        .state
        .core
        .store
        .get_or_create_user(2002, None)
        .await
        .unwrap();
    h.state
        .core
        .store
        .create_auth_token(
            user.id,
            "expired-token",
            Utc::now() - chrono::Duration::minutes(1),
        )
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(get("/auth/login?token=expired-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_status_reflects_session() {
    let h = harness().await;

    let response = h.app.clone().oneshot(get("/auth/status")).await.unwrap();
    assert_eq!(body_json(response).await["authenticated"], false);

    let user = h
        .state
        .core
        .store
        .get_or_create_user(2002, None)
        .await
        .unwrap();
    let link = h.state.auth.issue_magic_link(user.id).await.unwrap();
    let token = link.split("token=").nth(1).unwrap();
    let response = h
        .app
        .clone()
        .oneshot(get(&format!("/auth/login?token={token}")))
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_owned();

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/status")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["authenticated"], true);
    assert_eq!(json["user_id"].as_i64(), Some(user.id));
}

// -- Viewers & path traversal ---------------------------------------------

#[tokio::test]
async fn snapshot_path_traversal_is_forbidden() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/sneaky").await;

    // A snapshot row pointing outside the archive root must be refused even
    // though the row itself is well-formed.
    let outside = h.state.core.config.data_dir.join("secrets.html");
    tokio::fs::write(&outside, "<html>secret</html>").await.unwrap();
    let snapshot_id = h
        .state
        .core
        .store
        .record_snapshot_success(
            link_id,
            holocene_core::ArchiveService::LocalMonolith,
            &outside.to_string_lossy(),
            None,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/snapshot/{snapshot_id}"), &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn remote_snapshot_cannot_be_served_as_file() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/remote").await;
    let snapshot_id = h
        .state
        .core
        .store
        .record_snapshot_success(
            link_id,
            holocene_core::ArchiveService::InternetArchive,
            "https://web.archive.org/web/20240301093000/https://example.com/remote",
            None,
            serde_json::json!({}),
        )
        .await
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/snapshot/{snapshot_id}"), &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mono_viewer_versions() {
    let h = harness().await;
    let link_id = ingest_link(&h, "https://example.com/versions").await;

    for _ in 0..2 {
        let response = h
            .app
            .clone()
            .oneshot(post_json(
                &format!("/links/{link_id}/archive"),
                &h.bearer,
                &serde_json::json!({"use_ia": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    for uri in [
        format!("/mono/{link_id}"),
        format!("/mono/{link_id}/latest"),
        format!("/mono/{link_id}/first"),
        format!("/mono/{link_id}/1"),
    ] {
        let response = h.app.clone().oneshot(authed_get(&uri, &h.bearer)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }

    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/mono/{link_id}/5"), &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Plugins & channels ----------------------------------------------------

#[tokio::test]
async fn plugin_toggle_via_api() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/plugins", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"].as_u64(), Some(1));
    assert_eq!(json["plugins"][0]["name"], "test_toggle");
    assert_eq!(json["plugins"][0]["enabled"], true);

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/plugins/test_toggle/disable",
            &h.bearer,
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/plugins/test_toggle", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["enabled"], false);
    assert_eq!(json["state"], "disabled");

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/plugins/test_toggle/enable",
            &h.bearer,
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/plugins/does_not_exist", &h.bearer))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn channel_publish_and_history() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/channels/notes.test/publish",
            &h.bearer,
            &serde_json::json!({"hello": "world"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/channels/notes.test/history?limit=10", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["count"].as_u64(), Some(1));
    assert_eq!(json["messages"][0]["data"]["hello"], "world");
    assert_eq!(json["messages"][0]["sender"], "api");

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/channels", &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    let names: Vec<&str> = json["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"notes.test"));
}

// -- Library ---------------------------------------------------------------

#[tokio::test]
async fn books_and_papers_roundtrip() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/books",
            &h.bearer,
            &serde_json::json!({
                "title": "The Art of Computer Programming",
                "author": "Knuth",
                "publication_year": 1968
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let book_id = body_json(response).await["book_id"].as_i64().unwrap();

    let response = h
        .app
        .clone()
        .oneshot(authed_get(&format!("/books/{book_id}"), &h.bearer))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["author"], "Knuth");

    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/papers",
            &h.bearer,
            &serde_json::json!({
                "title": "Attention Is All You Need",
                "first_author": "Vaswani",
                "year": 2017,
                "doi": "10.48550/arXiv.1706.03762"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let paper_id = json["paper_id"].as_i64().unwrap();
    assert_eq!(json["was_new"], true);

    // Same DOI (different case and resolver prefix) is the same paper.
    let response = h
        .app
        .clone()
        .oneshot(post_json(
            "/papers",
            &h.bearer,
            &serde_json::json!({
                "title": "completely different",
                "doi": "https://doi.org/10.48550/ARXIV.1706.03762"
            }),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["paper_id"].as_i64(), Some(paper_id));
    assert_eq!(json["was_new"], false);

    let response = h
        .app
        .clone()
        .oneshot(authed_get("/papers?limit=10", &h.bearer))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["count"].as_u64(), Some(1));
}

//! Archive viewers: local monolith/WARC files and the ArchiveBox proxy.
//!
//! Every file-serving path goes through [`resolve_archive_path`], which
//! canonicalizes and prefix-checks against the archive root so a crafted
//! snapshot row or symlink can never walk the filesystem.

use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use regex::Regex;
use tracing::{info, warn};

use holocene_core::{ArchiveService, ArchiveSnapshot};

use super::AppState;
use crate::error::ApiError;

/// Replacement policy header for served monolith pages. The embedded meta
/// tag monolith writes is stripped because it blocks the daemon's own
/// inline chrome.
const MONOLITH_CSP: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline'; \
    style-src 'self' 'unsafe-inline' data:; \
    img-src 'self' data:; \
    font-src 'self' data:; \
    connect-src 'self'";

static CSP_META_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\s+http-equiv=["']Content-Security-Policy["'][^>]*>"#)
        .expect("valid regex")
});

static BODY_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body[^>]*>").expect("valid regex"));

/// `GET /mono/{link_id}` and `/mono/{link_id}/latest`
pub async fn mono_latest(
    State(state): State<AppState>,
    Path(link_id): Path<i64>,
) -> Result<Response, ApiError> {
    serve_monolith(&state, link_id, MonolithVersion::Latest).await
}

/// `GET /mono/{link_id}/first`
pub async fn mono_first(
    State(state): State<AppState>,
    Path(link_id): Path<i64>,
) -> Result<Response, ApiError> {
    serve_monolith(&state, link_id, MonolithVersion::First).await
}

/// `GET /mono/{link_id}/{index}` - 0 is the latest, 1 the one before, etc.
pub async fn mono_index(
    State(state): State<AppState>,
    Path((link_id, index)): Path<(i64, usize)>,
) -> Result<Response, ApiError> {
    serve_monolith(&state, link_id, MonolithVersion::Index(index)).await
}

enum MonolithVersion {
    Latest,
    First,
    Index(usize),
}

async fn serve_monolith(
    state: &AppState,
    link_id: i64,
    version: MonolithVersion,
) -> Result<Response, ApiError> {
    let snapshots = state.core.store.monolith_snapshots(link_id).await?;
    if snapshots.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no monolith archives for link {link_id}"
        )));
    }

    // Rows come newest first.
    let snapshot: &ArchiveSnapshot = match version {
        MonolithVersion::Latest => &snapshots[0],
        MonolithVersion::First => snapshots.last().expect("non-empty"),
        MonolithVersion::Index(index) => snapshots.get(index).ok_or_else(|| {
            ApiError::NotFound(format!(
                "snapshot index {index} out of range (0-{})",
                snapshots.len() - 1
            ))
        })?,
    };

    let path = snapshot
        .snapshot_url
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("snapshot has no file".into()))?;
    serve_archive_file(state, path, ArchiveService::LocalMonolith).await
}

/// `GET /snapshot/{id}` - serve one snapshot row's artifact. Only local
/// services have files to serve.
pub async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let snapshot = state
        .core
        .store
        .get_snapshot(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("snapshot {id} not found")))?;

    if !snapshot.service.is_local() {
        return Err(ApiError::Validation(
            "only local archives can be served directly".into(),
        ));
    }

    let path = snapshot
        .snapshot_url
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("snapshot has no file".into()))?;
    serve_archive_file(&state, path, snapshot.service).await
}

/// Validate that `candidate` resolves inside `archive_root`.
///
/// Symlinks are resolved before the prefix check; a path that escapes the
/// root is rejected with 403 whether or not it exists.
pub async fn resolve_archive_path(
    archive_root: &FsPath,
    candidate: &str,
) -> Result<PathBuf, ApiError> {
    let candidate = FsPath::new(candidate);
    if !candidate.is_absolute() {
        return Err(ApiError::Validation("invalid archive path".into()));
    }

    // Lexical containment first, so nonexistent escape attempts still get
    // 403 rather than leaking existence information.
    if !lexically_normalized(candidate).starts_with(lexically_normalized(archive_root)) {
        warn!(path = %candidate.display(), "archive path outside root");
        return Err(ApiError::Forbidden("access denied".into()));
    }

    let root = tokio::fs::canonicalize(archive_root)
        .await
        .map_err(|e| ApiError::Internal(Box::new(e)))?;
    let resolved = match tokio::fs::canonicalize(candidate).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("archive file not found".into()));
        }
        Err(e) => return Err(ApiError::Internal(Box::new(e))),
    };

    if !resolved.starts_with(&root) {
        warn!(path = %resolved.display(), "archive path escapes root after resolution");
        return Err(ApiError::Forbidden("access denied".into()));
    }
    Ok(resolved)
}

fn lexically_normalized(path: &FsPath) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}

async fn serve_archive_file(
    state: &AppState,
    path: &str,
    service: ArchiveService,
) -> Result<Response, ApiError> {
    let archive_root = state.core.config.archive_root();
    let resolved = resolve_archive_path(&archive_root, path).await?;

    match service {
        ArchiveService::LocalMonolith => {
            let html = tokio::fs::read_to_string(&resolved)
                .await
                .map_err(|e| ApiError::Internal(Box::new(e)))?;
            let stripped = CSP_META_TAG.replace_all(&html, "");

            let mut response = Html(stripped.into_owned()).into_response();
            response.headers_mut().insert(
                header::CONTENT_SECURITY_POLICY,
                MONOLITH_CSP.parse().map_err(|e| {
                    ApiError::Internal(Box::new(e))
                })?,
            );
            Ok(response)
        }
        _ => {
            let bytes = tokio::fs::read(&resolved)
                .await
                .map_err(|e| ApiError::Internal(Box::new(e)))?;
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                "application/warc"
                    .parse()
                    .map_err(|e| ApiError::Internal(Box::new(e)))?,
            );
            Ok((StatusCode::OK, headers, bytes).into_response())
        }
    }
}

/// `GET /box/{snapshot_id}` - proxy an ArchiveBox snapshot, injecting a
/// fixed archive banner right after `<body>`.
pub async fn archivebox(
    State(state): State<AppState>,
    Path(snapshot_id): Path<String>,
) -> Result<Response, ApiError> {
    let host = &state.core.config.archive.archivebox_host;
    if host.is_empty() {
        return Err(ApiError::Validation("archivebox is not configured".into()));
    }

    let (row, original_url) = state
        .core
        .store
        .find_archivebox_snapshot(&snapshot_id)
        .await?
        .map_or((None, "unknown".to_owned()), |(snapshot, url)| {
            (Some(snapshot), url)
        });

    let upstream = format!("http://{host}:8000/archive/{snapshot_id}/singlefile.html");
    info!(upstream, "proxying archivebox snapshot");

    let response = reqwest::Client::new()
        .get(&upstream)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ApiError::Upstream {
                    status: 504,
                    message: "archivebox request timed out".into(),
                }
            } else {
                ApiError::Upstream {
                    status: 502,
                    message: "cannot connect to archivebox".into(),
                }
            }
        })?;

    match response.status().as_u16() {
        200 => {}
        404 => {
            return Err(ApiError::NotFound(format!(
                "archivebox snapshot {snapshot_id} not found"
            )));
        }
        status => {
            return Err(ApiError::Upstream {
                status,
                message: format!("archivebox returned status {status}"),
            });
        }
    }

    let html = response
        .text()
        .await
        .map_err(|e| ApiError::Internal(Box::new(e)))?;

    let archive_date = row
        .and_then(|s| s.archive_date)
        .map_or_else(|| "unknown date".to_owned(), |d| d.format("%Y-%m-%d").to_string());
    let banner = archive_banner(&original_url, &archive_date);

    let merged = match BODY_OPEN_TAG.find(&html) {
        Some(tag) => {
            let insert_at = tag.end();
            format!("{}{banner}{}", &html[..insert_at], &html[insert_at..])
        }
        None => format!("{banner}{html}"),
    };

    Ok(Html(merged).into_response())
}

/// Fixed-size banner injected into proxied ArchiveBox pages.
fn archive_banner(original_url: &str, archive_date: &str) -> String {
    format!(
        r#"<div id="holocene-archive-banner" style="position:fixed;top:0;left:0;right:0;height:44px;z-index:2147483647;display:flex;align-items:center;justify-content:space-between;padding:0 16px;background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);color:#fff;font:13px -apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;box-shadow:0 2px 8px rgba(0,0,0,.2);box-sizing:border-box;">
<span><strong>Holocene Archive</strong> &middot; archived {archive_date}</span>
<a href="{original_url}" target="_blank" rel="noopener noreferrer" style="color:#fff;text-decoration:none;padding:4px 12px;border:1px solid rgba(255,255,255,.4);border-radius:4px;">Visit live site</a>
</div>
<div style="height:44px;"></div>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csp_meta_is_stripped() {
        let html = r#"<html><head>
            <meta http-equiv="Content-Security-Policy" content="default-src 'none'">
            <title>t</title></head><body>hi</body></html>"#;
        let stripped = CSP_META_TAG.replace_all(html, "");
        assert!(!stripped.contains("Content-Security-Policy"));
        assert!(stripped.contains("<title>t</title>"));
    }

    #[test]
    fn banner_is_injected_after_body_tag() {
        let html = r#"<html><body class="page dark">content</body></html>"#;
        let tag = BODY_OPEN_TAG.find(html).unwrap();
        assert_eq!(&html[tag.start()..tag.end()], r#"<body class="page dark">"#);
    }

    #[test]
    fn lexical_normalization_collapses_dotdot() {
        assert_eq!(
            lexically_normalized(FsPath::new("/data/archives/monolith/../../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            lexically_normalized(FsPath::new("/data/archives/./monolith/a.html")),
            PathBuf::from("/data/archives/monolith/a.html")
        );
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let root = std::env::temp_dir().join("holocene-viewer-root");
        tokio::fs::create_dir_all(&root).await.unwrap();

        let escape = format!("{}/../outside.html", root.display());
        let result = resolve_archive_path(&root, &escape).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));

        let relative = resolve_archive_path(&root, "relative/path.html").await;
        assert!(matches!(relative, Err(ApiError::Validation(_))));

        let absolute_elsewhere = resolve_archive_path(&root, "/etc/passwd").await;
        assert!(matches!(absolute_elsewhere, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    async fn symlink_escape_is_rejected() {
        let base = std::env::temp_dir().join("holocene-viewer-symlink");
        let root = base.join("archives");
        let outside = base.join("outside");
        tokio::fs::create_dir_all(root.join("monolith")).await.unwrap();
        tokio::fs::create_dir_all(&outside).await.unwrap();
        tokio::fs::write(outside.join("secret.html"), "secret").await.unwrap();

        let link = root.join("monolith").join("sneaky.html");
        let _ = tokio::fs::remove_file(&link).await;
        #[cfg(unix)]
        {
            tokio::fs::symlink(outside.join("secret.html"), &link)
                .await
                .unwrap();
            let result =
                resolve_archive_path(&root, &link.to_string_lossy()).await;
            assert!(matches!(result, Err(ApiError::Forbidden(_))));
        }
    }

    #[tokio::test]
    async fn valid_file_resolves() {
        let root = std::env::temp_dir().join("holocene-viewer-ok");
        tokio::fs::create_dir_all(root.join("monolith")).await.unwrap();
        let file = root.join("monolith").join("page.html");
        tokio::fs::write(&file, "<html></html>").await.unwrap();

        let resolved = resolve_archive_path(&root, &file.to_string_lossy())
            .await
            .unwrap();
        assert!(resolved.ends_with("monolith/page.html"));
    }
}

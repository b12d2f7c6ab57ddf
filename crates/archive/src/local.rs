//! Local snapshotter: shells out to `monolith` for single-file HTML and to
//! `wget` for WARC captures.
//!
//! Artifacts land under `{archive_root}/{monolith,warc}/` with filenames of
//! the form `{domain}_{hash8}_{timestamp}.{ext}`, so repeated captures of the
//! same URL never collide.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info};

use holocene_core::archive_filename;

use crate::error::ProviderError;
use crate::provider::{LocalFormat, SnapshotOutcome, Snapshotter};

/// Snapshotter backed by command-line archiving tools.
pub struct LocalSnapshotter {
    archive_root: PathBuf,
}

impl LocalSnapshotter {
    #[must_use]
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
        }
    }

    #[must_use]
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    async fn prepare_output_path(&self, url: &str, format: LocalFormat) -> Result<PathBuf, ProviderError> {
        let dir = self.archive_root.join(format.subdir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProviderError::ExecutionFailed(format!("create {}: {e}", dir.display())))?;
        Ok(dir.join(archive_filename(url, format.extension(), Utc::now())))
    }

    async fn run_tool(
        &self,
        tool: &str,
        command: &mut Command,
        timeout: Duration,
    ) -> Result<Output, ProviderError> {
        let spawned = command.output();
        let output = tokio::time::timeout(timeout, spawned)
            .await
            .map_err(|_| ProviderError::Timeout(timeout))?
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ProviderError::ToolMissing(tool.to_owned()),
                _ => ProviderError::ExecutionFailed(e.to_string()),
            })?;
        Ok(output)
    }

    async fn snapshot_monolith(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<SnapshotOutcome, ProviderError> {
        let output_path = self.prepare_output_path(url, LocalFormat::Monolith).await?;
        debug!(url, path = %output_path.display(), "running monolith");

        // -j keep javascript, -i keep images, -I isolate the document so the
        // archived page cannot phone home.
        let output = self
            .run_tool(
                "monolith",
                Command::new("monolith")
                    .args(["-j", "-i", "-I", url, "-o"])
                    .arg(&output_path),
                timeout,
            )
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_owned()
            } else {
                stderr.trim().to_owned()
            };
            return Err(ProviderError::ExecutionFailed(format!(
                "monolith exited with {}: {message}",
                output.status
            )));
        }

        self.finish(url, output_path).await
    }

    async fn snapshot_warc(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<SnapshotOutcome, ProviderError> {
        let output_path = self.prepare_output_path(url, LocalFormat::Warc).await?;
        // wget appends `.warc.gz` itself; hand it the bare base name.
        let warc_base = output_path
            .to_string_lossy()
            .trim_end_matches(".warc.gz")
            .to_owned();
        debug!(url, path = %output_path.display(), "running wget warc");

        let output = self
            .run_tool(
                "wget",
                Command::new("wget")
                    .arg("--warc-file")
                    .arg(&warc_base)
                    .args([
                        "--warc-cdx",
                        "--page-requisites",
                        "--adjust-extension",
                        "--convert-links",
                        "--no-directories",
                        "--timeout",
                        "30",
                        url,
                    ])
                    .current_dir(self.archive_root.join(LocalFormat::Warc.subdir())),
                timeout,
            )
            .await?;

        // wget exits nonzero on partial asset failures; the WARC file itself
        // decides success.
        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::ExecutionFailed(format!(
                "warc file not created: {}",
                stderr.trim()
            )));
        }

        self.finish(url, output_path).await
    }

    async fn finish(&self, url: &str, path: PathBuf) -> Result<SnapshotOutcome, ProviderError> {
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ProviderError::ExecutionFailed(format!("stat {}: {e}", path.display())))?;
        info!(url, path = %path.display(), size = meta.len(), "local archive written");
        Ok(SnapshotOutcome {
            path,
            file_size: meta.len(),
            archive_date: Utc::now(),
        })
    }
}

#[async_trait]
impl Snapshotter for LocalSnapshotter {
    async fn snapshot(
        &self,
        url: &str,
        format: LocalFormat,
        timeout: Duration,
    ) -> Result<SnapshotOutcome, ProviderError> {
        match format {
            LocalFormat::Monolith => self.snapshot_monolith(url, timeout).await,
            LocalFormat::Warc => self.snapshot_warc(url, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tool_is_reported_as_such() {
        let dir = std::env::temp_dir().join("holocene-local-test");
        let snapshotter = LocalSnapshotter::new(&dir);

        let result = snapshotter
            .run_tool(
                "definitely-not-installed",
                &mut Command::new("definitely-not-installed"),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(ProviderError::ToolMissing(_))));
    }

    #[tokio::test]
    async fn output_path_is_under_format_subdir() {
        let dir = std::env::temp_dir().join("holocene-local-test-paths");
        let snapshotter = LocalSnapshotter::new(&dir);

        let path = snapshotter
            .prepare_output_path("https://example.com/a", LocalFormat::Monolith)
            .await
            .unwrap();
        assert!(path.starts_with(dir.join("monolith")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("example.com_"));
        assert!(name.ends_with(".html"));
    }
}

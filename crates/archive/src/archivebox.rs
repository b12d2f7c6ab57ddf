//! ArchiveBox reached over SSH.
//!
//! The remote instance owns deduplication and extraction; this client only
//! submits URLs, reads the snapshot id back out of the tool's output, and
//! inspects the work queue so the service can avoid piling onto a backlog.

use std::io::ErrorKind;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::{ArchiveBoxRemote, BoxOutcome, QueueStatus};

/// ArchiveBox snapshot ids are fractional unix timestamps, e.g.
/// `1764018763.676681`, surfaced in output as `/archive/<id>`.
static SNAPSHOT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/archive/(\d+\.\d+)").expect("valid regex"));

/// SSH-backed ArchiveBox client.
pub struct ArchiveBoxClient {
    ssh_user: String,
    ssh_host: String,
    web_port: u16,
}

impl ArchiveBoxClient {
    #[must_use]
    pub fn new(ssh_user: impl Into<String>, ssh_host: impl Into<String>) -> Self {
        Self {
            ssh_user: ssh_user.into(),
            ssh_host: ssh_host.into(),
            web_port: 8000,
        }
    }

    async fn run_remote(&self, command: &str, timeout: Duration) -> Result<String, ProviderError> {
        let target = format!("{}@{}", self.ssh_user, self.ssh_host);
        debug!(target, command, "running remote archivebox command");

        let output = tokio::time::timeout(
            timeout,
            Command::new("ssh")
                .args(["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"])
                .arg(&target)
                .arg(format!("archivebox {command}"))
                .output(),
        )
        .await
        .map_err(|_| ProviderError::Timeout(timeout))?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProviderError::ToolMissing("ssh".to_owned()),
            _ => ProviderError::Connection(e.to_string()),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::ExecutionFailed(format!(
                "remote command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn extract_snapshot_id(output: &str) -> Option<String> {
        SNAPSHOT_ID
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_owned())
    }
}

#[async_trait]
impl ArchiveBoxRemote for ArchiveBoxClient {
    async fn archive(&self, url: &str, timeout: Duration) -> Result<BoxOutcome, ProviderError> {
        // Single quotes keep shell metacharacters in the URL inert remotely.
        let escaped = url.replace('\'', "'\\''");
        let stdout = self.run_remote(&format!("add '{escaped}'"), timeout).await?;

        let snapshot_id = Self::extract_snapshot_id(&stdout).ok_or_else(|| {
            ProviderError::ExecutionFailed("snapshot id not found in archivebox output".to_owned())
        })?;

        let archive_url = format!(
            "http://{}:{}/archive/{snapshot_id}",
            self.ssh_host, self.web_port
        );
        info!(url, snapshot_id, "archived with archivebox");
        Ok(BoxOutcome {
            snapshot_id,
            archive_url,
        })
    }

    async fn queue_status(&self) -> Result<QueueStatus, ProviderError> {
        let timeout = Duration::from_secs(15);
        let pending = self
            .run_remote("list --status=pending --json 2>/dev/null | wc -l", timeout)
            .await?
            .trim()
            .parse()
            .unwrap_or(0);
        let failed = self
            .run_remote("list --status=incomplete --json 2>/dev/null | wc -l", timeout)
            .await?
            .trim()
            .parse()
            .unwrap_or(0);

        Ok(QueueStatus { pending, failed })
    }
}

//! Unified archiving façade.
//!
//! Coordinates the local snapshotter, the Internet Archive save endpoint,
//! and ArchiveBox; records every attempt in the snapshot ledger before
//! moving on, and never raises provider failures to the caller: the result
//! carries per-service outcomes and the overall call succeeds if any
//! service did.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use holocene_core::{ArchiveService, SnapshotStatus};
use holocene_store::{Store, StoreError};

use crate::provider::{
    ArchiveBoxRemote, LocalFormat, SavePageClient, SaveStatus, Snapshotter,
};

/// Per-call archiving policy. The defaults mirror the daemon configuration:
/// local monolith first, then the Internet Archive, ArchiveBox opt-in.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveOptions {
    pub local_format: Option<LocalFormat>,
    pub use_ia: bool,
    /// Submit to IA even when a prior success snapshot exists.
    pub force_ia: bool,
    pub use_archivebox: bool,
    /// Submit to ArchiveBox even when its queue is above the skip threshold.
    pub force_archivebox: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            local_format: Some(LocalFormat::Monolith),
            use_ia: true,
            force_ia: false,
            use_archivebox: false,
            force_archivebox: false,
        }
    }
}

/// Outcome of one service within an archive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Success,
    Failed,
    AlreadyArchived,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceResult {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResult {
    fn success(snapshot_id: i64, snapshot_url: String) -> Self {
        Self {
            status: ServiceStatus::Success,
            snapshot_id: Some(snapshot_id),
            snapshot_url: Some(snapshot_url),
            file_size: None,
            attempts: None,
            error: None,
        }
    }

    fn failed(error: String, attempts: i64) -> Self {
        Self {
            status: ServiceStatus::Failed,
            snapshot_id: None,
            snapshot_url: None,
            file_size: None,
            attempts: Some(attempts),
            error: Some(error),
        }
    }

    fn skipped(reason: String) -> Self {
        Self {
            status: ServiceStatus::Skipped,
            snapshot_id: None,
            snapshot_url: None,
            file_size: None,
            attempts: None,
            error: Some(reason),
        }
    }
}

/// Structured result of [`ArchivingService::archive_url`].
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResult {
    pub link_id: i64,
    pub url: String,
    pub success: bool,
    pub services: BTreeMap<&'static str, ServiceResult>,
    pub errors: Vec<String>,
}

/// Summary of one bounded retry sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetrySummary {
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Coordinates archive providers and the snapshot ledger.
pub struct ArchivingService {
    store: Store,
    snapshotter: Arc<dyn Snapshotter>,
    save_client: Option<Arc<dyn SavePageClient>>,
    archivebox: Option<Arc<dyn ArchiveBoxRemote>>,
    queue_skip_threshold: u64,
    provider_timeout: Duration,
}

impl ArchivingService {
    pub const DEFAULT_RETRY_BATCH: i64 = 50;

    #[must_use]
    pub fn new(
        store: Store,
        snapshotter: Arc<dyn Snapshotter>,
        save_client: Option<Arc<dyn SavePageClient>>,
        archivebox: Option<Arc<dyn ArchiveBoxRemote>>,
        queue_skip_threshold: u64,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            store,
            snapshotter,
            save_client,
            archivebox,
            queue_skip_threshold,
            provider_timeout,
        }
    }

    /// Archive a URL across the configured services, recording every attempt.
    pub async fn archive_url(
        &self,
        link_id: i64,
        url: &str,
        options: ArchiveOptions,
    ) -> Result<ArchiveResult, StoreError> {
        let mut result = ArchiveResult {
            link_id,
            url: url.to_owned(),
            success: false,
            services: BTreeMap::new(),
            errors: Vec::new(),
        };

        if let Some(format) = options.local_format {
            self.archive_local(link_id, url, format, &mut result).await?;
        }

        if options.use_ia {
            self.archive_ia(link_id, url, options.force_ia, &mut result)
                .await?;
        }

        if options.use_archivebox {
            self.archive_box(link_id, url, options.force_archivebox, &mut result)
                .await?;
        }

        result.success = result.services.values().any(|s| {
            matches!(
                s.status,
                ServiceStatus::Success | ServiceStatus::AlreadyArchived
            )
        });
        Ok(result)
    }

    async fn archive_local(
        &self,
        link_id: i64,
        url: &str,
        format: LocalFormat,
        result: &mut ArchiveResult,
    ) -> Result<(), StoreError> {
        let service = format.service();
        info!(url, service = service.as_str(), "starting local archive");

        match self
            .snapshotter
            .snapshot(url, format, self.provider_timeout)
            .await
        {
            Ok(outcome) => {
                let path = outcome.path.to_string_lossy().into_owned();
                let metadata = serde_json::json!({
                    "file_size": outcome.file_size,
                    "format": format.subdir(),
                });
                let snapshot_id = self
                    .store
                    .record_snapshot_success(
                        link_id,
                        service,
                        &path,
                        Some(outcome.archive_date),
                        metadata,
                    )
                    .await?;

                let mut entry = ServiceResult::success(snapshot_id, path);
                entry.file_size = Some(outcome.file_size);
                result.services.insert(service.as_str(), entry);
            }
            Err(e) => {
                warn!(url, service = service.as_str(), error = %e, transient = e.is_transient(),
                    "local archive failed");
                let (attempts, _) = self
                    .store
                    .record_snapshot_failure(link_id, service, &e.to_string())
                    .await?;
                result
                    .services
                    .insert(service.as_str(), ServiceResult::failed(e.to_string(), attempts));
                result.errors.push(format!("local archive failed: {e}"));
            }
        }
        Ok(())
    }

    async fn archive_ia(
        &self,
        link_id: i64,
        url: &str,
        force: bool,
        result: &mut ArchiveResult,
    ) -> Result<(), StoreError> {
        let service = ArchiveService::InternetArchive;
        let Some(client) = &self.save_client else {
            result
                .errors
                .push("internet archive client not configured".to_owned());
            return Ok(());
        };

        // Cross-call dedup: a prior success snapshot short-circuits the
        // external call entirely unless the caller forces a fresh capture.
        if !force {
            if let Some(prior) = self.store.latest_success(link_id, service).await? {
                info!(url, "prior internet archive snapshot found, skipping");
                result.services.insert(
                    service.as_str(),
                    ServiceResult {
                        status: ServiceStatus::AlreadyArchived,
                        snapshot_id: Some(prior.id),
                        snapshot_url: prior.snapshot_url,
                        file_size: None,
                        attempts: None,
                        error: None,
                    },
                );
                return Ok(());
            }
        }

        info!(url, "starting internet archive save");
        match client.save_url(url, force, self.provider_timeout).await {
            Ok(outcome) => {
                let snapshot_id = self
                    .store
                    .record_snapshot_success(
                        link_id,
                        service,
                        &outcome.snapshot_url,
                        outcome.archive_date,
                        serde_json::json!({}),
                    )
                    .await?;

                let status = match outcome.status {
                    SaveStatus::Archived => ServiceStatus::Success,
                    SaveStatus::AlreadyArchived => ServiceStatus::AlreadyArchived,
                };
                result.services.insert(
                    service.as_str(),
                    ServiceResult {
                        status,
                        snapshot_id: Some(snapshot_id),
                        snapshot_url: Some(outcome.snapshot_url),
                        file_size: None,
                        attempts: None,
                        error: None,
                    },
                );
            }
            Err(e) => {
                warn!(url, error = %e, transient = e.is_transient(), "internet archive save failed");
                let (attempts, _) = self
                    .store
                    .record_snapshot_failure(link_id, service, &e.to_string())
                    .await?;
                result
                    .services
                    .insert(service.as_str(), ServiceResult::failed(e.to_string(), attempts));
                result.errors.push(format!("internet archive failed: {e}"));
            }
        }
        Ok(())
    }

    async fn archive_box(
        &self,
        link_id: i64,
        url: &str,
        force: bool,
        result: &mut ArchiveResult,
    ) -> Result<(), StoreError> {
        let service = ArchiveService::Archivebox;
        let Some(remote) = &self.archivebox else {
            result.errors.push("archivebox not configured".to_owned());
            return Ok(());
        };

        if !force {
            match remote.queue_status().await {
                Ok(queue) => {
                    info!(pending = queue.pending, failed = queue.failed, "archivebox queue");
                    if queue.pending > self.queue_skip_threshold {
                        let reason = format!(
                            "queue depth {} above threshold {}",
                            queue.pending, self.queue_skip_threshold
                        );
                        result
                            .services
                            .insert(service.as_str(), ServiceResult::skipped(reason));
                        return Ok(());
                    }
                }
                Err(e) => warn!(error = %e, "archivebox queue status unavailable"),
            }
        }

        // Archiving via the remote extractor chain is slow; give it triple
        // the per-provider budget.
        match remote.archive(url, self.provider_timeout * 3).await {
            Ok(outcome) => {
                let metadata = serde_json::json!({ "snapshot_id": outcome.snapshot_id });
                let snapshot_id = self
                    .store
                    .record_snapshot_success(
                        link_id,
                        service,
                        &outcome.archive_url,
                        Some(Utc::now()),
                        metadata,
                    )
                    .await?;
                result.services.insert(
                    service.as_str(),
                    ServiceResult::success(snapshot_id, outcome.archive_url),
                );
            }
            Err(e) => {
                warn!(url, error = %e, transient = e.is_transient(), "archivebox failed");
                let (attempts, _) = self
                    .store
                    .record_snapshot_failure(link_id, service, &e.to_string())
                    .await?;
                result
                    .services
                    .insert(service.as_str(), ServiceResult::failed(e.to_string(), attempts));
                result.errors.push(format!("archivebox failed: {e}"));
            }
        }
        Ok(())
    }

    /// Retry failed snapshots whose backoff deadline has passed. Bounded to
    /// [`Self::DEFAULT_RETRY_BATCH`] rows per invocation.
    pub async fn retry_failed(&self, max_attempts: i64) -> Result<RetrySummary, StoreError> {
        self.retry_failed_at(max_attempts, Utc::now()).await
    }

    /// Retry sweep with an explicit clock, for deterministic tests.
    pub async fn retry_failed_at(
        &self,
        max_attempts: i64,
        now: DateTime<Utc>,
    ) -> Result<RetrySummary, StoreError> {
        let eligible = self
            .store
            .get_retry_eligible_snapshots(max_attempts, now, Self::DEFAULT_RETRY_BATCH)
            .await?;

        let mut summary = RetrySummary::default();
        for snapshot in eligible {
            debug_assert_eq!(snapshot.status, SnapshotStatus::Failed);
            let Some(link) = self.store.get_link(snapshot.link_id).await? else {
                continue;
            };

            let options = match snapshot.service {
                ArchiveService::LocalMonolith => ArchiveOptions {
                    local_format: Some(LocalFormat::Monolith),
                    use_ia: false,
                    force_ia: false,
                    use_archivebox: false,
                    force_archivebox: false,
                },
                ArchiveService::LocalWarc => ArchiveOptions {
                    local_format: Some(LocalFormat::Warc),
                    use_ia: false,
                    force_ia: false,
                    use_archivebox: false,
                    force_archivebox: false,
                },
                ArchiveService::InternetArchive => ArchiveOptions {
                    local_format: None,
                    use_ia: true,
                    force_ia: true,
                    use_archivebox: false,
                    force_archivebox: false,
                },
                ArchiveService::Archivebox => ArchiveOptions {
                    local_format: None,
                    use_ia: false,
                    force_ia: false,
                    use_archivebox: true,
                    force_archivebox: true,
                },
            };

            info!(
                link_id = link.id,
                service = snapshot.service.as_str(),
                attempt = snapshot.attempts + 1,
                "retrying failed archive"
            );
            summary.retried += 1;
            let outcome = self.archive_url(link.id, &link.url, options).await?;
            if outcome.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        Ok(summary)
    }
}

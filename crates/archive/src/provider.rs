//! Provider interfaces for the archiving pipeline.
//!
//! Each provider is an opaque collaborator behind an object-safe async trait
//! so the service can be exercised with mocks: a local snapshotter writing
//! files, the Internet Archive save endpoint, and an ArchiveBox instance
//! reached over SSH.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use holocene_core::ArchiveService;

use crate::error::ProviderError;

/// Local archive formats the snapshotter can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFormat {
    /// Single-file HTML with embedded assets.
    Monolith,
    /// ISO-standard WARC container.
    Warc,
}

impl LocalFormat {
    #[must_use]
    pub fn service(&self) -> ArchiveService {
        match self {
            Self::Monolith => ArchiveService::LocalMonolith,
            Self::Warc => ArchiveService::LocalWarc,
        }
    }

    /// Subdirectory under the archive root.
    #[must_use]
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Monolith => "monolith",
            Self::Warc => "warc",
        }
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Monolith => "html",
            Self::Warc => "warc.gz",
        }
    }
}

/// A freshly written local archive artifact.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub path: PathBuf,
    pub file_size: u64,
    pub archive_date: DateTime<Utc>,
}

/// Writes a URL to a local archive file. Every call produces a new artifact.
#[async_trait]
pub trait Snapshotter: Send + Sync {
    async fn snapshot(
        &self,
        url: &str,
        format: LocalFormat,
        timeout: Duration,
    ) -> Result<SnapshotOutcome, ProviderError>;
}

/// How the save endpoint handled a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// A new capture was made.
    Archived,
    /// The endpoint reported an existing recent capture.
    AlreadyArchived,
}

/// Result of submitting a URL to the Internet Archive save endpoint.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub status: SaveStatus,
    pub snapshot_url: String,
    pub archive_date: Option<DateTime<Utc>>,
}

/// Client for the Internet Archive save endpoint.
#[async_trait]
pub trait SavePageClient: Send + Sync {
    /// Submit a URL for capture. With `force` false the client may answer
    /// from the availability endpoint without triggering a new capture.
    async fn save_url(
        &self,
        url: &str,
        force: bool,
        timeout: Duration,
    ) -> Result<SaveOutcome, ProviderError>;
}

/// A snapshot created on the remote ArchiveBox instance.
#[derive(Debug, Clone)]
pub struct BoxOutcome {
    /// ArchiveBox timestamp-style snapshot id, e.g. `1764018763.676681`.
    pub snapshot_id: String,
    pub archive_url: String,
}

/// Work backlog on the remote ArchiveBox instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatus {
    pub pending: u64,
    pub failed: u64,
}

/// An ArchiveBox instance reached out-of-process.
#[async_trait]
pub trait ArchiveBoxRemote: Send + Sync {
    async fn archive(&self, url: &str, timeout: Duration) -> Result<BoxOutcome, ProviderError>;

    async fn queue_status(&self) -> Result<QueueStatus, ProviderError>;
}

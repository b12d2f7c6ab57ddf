use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The archive provider a snapshot row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveService {
    /// Single-file HTML produced by the local snapshotter.
    LocalMonolith,
    /// WARC container produced by the local snapshotter.
    LocalWarc,
    /// Internet Archive save endpoint.
    InternetArchive,
    /// ArchiveBox instance reached over SSH.
    Archivebox,
}

impl ArchiveService {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalMonolith => "local_monolith",
            Self::LocalWarc => "local_warc",
            Self::InternetArchive => "internet_archive",
            Self::Archivebox => "archivebox",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "local_monolith" => Ok(Self::LocalMonolith),
            "local_warc" => Ok(Self::LocalWarc),
            "internet_archive" => Ok(Self::InternetArchive),
            "archivebox" => Ok(Self::Archivebox),
            other => Err(CoreError::UnknownVariant {
                kind: "archive service",
                value: other.to_owned(),
            }),
        }
    }

    /// Whether the snapshot artifact lives on the local filesystem.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::LocalMonolith | Self::LocalWarc)
    }
}

/// Terminal state of one archive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Success,
    Failed,
}

impl SnapshotStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::UnknownVariant {
                kind: "snapshot status",
                value: other.to_owned(),
            }),
        }
    }
}

/// One attempt to preserve a URL at one provider at one point in time.
///
/// Multiple rows per `(link_id, service)` are expected; the row with the
/// greatest `created_at` is the current state for that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub id: i64,
    pub link_id: i64,
    pub service: ArchiveService,
    pub status: SnapshotStatus,
    /// Filesystem path for local services, URL for remote ones.
    pub snapshot_url: Option<String>,
    pub archive_date: Option<DateTime<Utc>>,
    /// Running count of consecutive failures for this `(link, service)` pair;
    /// 1 on the first failure, reset by any success.
    pub attempts: i64,
    pub next_retry_after: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_roundtrip() {
        for service in [
            ArchiveService::LocalMonolith,
            ArchiveService::LocalWarc,
            ArchiveService::InternetArchive,
            ArchiveService::Archivebox,
        ] {
            assert_eq!(ArchiveService::parse(service.as_str()).unwrap(), service);
        }
        assert!(ArchiveService::parse("carbon_paper").is_err());
    }

    #[test]
    fn local_services() {
        assert!(ArchiveService::LocalMonolith.is_local());
        assert!(ArchiveService::LocalWarc.is_local());
        assert!(!ArchiveService::InternetArchive.is_local());
        assert!(!ArchiveService::Archivebox.is_local());
    }

    #[test]
    fn status_roundtrip() {
        assert_eq!(
            SnapshotStatus::parse("success").unwrap(),
            SnapshotStatus::Success
        );
        assert_eq!(
            SnapshotStatus::parse("failed").unwrap(),
            SnapshotStatus::Failed
        );
        assert!(SnapshotStatus::parse("pending").is_err());
    }
}

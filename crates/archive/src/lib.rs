pub mod archivebox;
pub mod error;
pub mod ia;
pub mod local;
pub mod provider;
pub mod service;

pub use archivebox::ArchiveBoxClient;
pub use error::ProviderError;
pub use ia::IaClient;
pub use local::LocalSnapshotter;
pub use provider::{
    ArchiveBoxRemote, BoxOutcome, LocalFormat, QueueStatus, SaveOutcome, SavePageClient,
    SaveStatus, Snapshotter, SnapshotOutcome,
};
pub use service::{
    ArchiveOptions, ArchiveResult, ArchivingService, RetrySummary, ServiceResult, ServiceStatus,
};

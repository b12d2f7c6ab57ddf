pub mod backoff;
pub mod error;
pub mod library;
pub mod link;
pub mod snapshot;
pub mod url;
pub mod user;

pub use backoff::{MAX_BACKOFF_EXPONENT, retry_delay};
pub use error::CoreError;
pub use library::{Book, Paper, ReadingStatus, normalize_doi};
pub use link::{Link, LinkHealthStats, LinkStatus, TrustTier};
pub use snapshot::{ArchiveService, ArchiveSnapshot, SnapshotStatus};
pub use url::{archive_filename, canonicalize_url, is_valid_url, should_archive_url};
pub use user::{ApiToken, AuthToken, DaemonSetting, User};

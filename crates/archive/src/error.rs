use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by archive providers.
///
/// The transient/permanent split drives logging and the caller's expectation
/// of whether a later retry can succeed; every failure is recorded in the
/// snapshot ledger either way.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider did not finish within the allowed duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// A network or transport-level failure, including DNS.
    #[error("connection error: {0}")]
    Connection(String),

    /// The upstream service answered with a non-success status.
    #[error("upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    /// A required local tool is not installed.
    #[error("tool not available: {0}")]
    ToolMissing(String),

    /// The provider ran but failed to produce an artifact.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl ProviderError {
    /// Whether a retry may plausibly succeed without operator intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            Self::ToolMissing(_) | Self::ExecutionFailed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::from_secs(0))
        } else if let Some(status) = err.status() {
            Self::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Connection(err.to_string())
        }
    }
}

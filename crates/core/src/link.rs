use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Coarse freshness classification of a web archive, derived purely from the
/// archive date. Used as a priority signal when scheduling health checks:
/// older archives are harder to replace, so they are probed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustTier {
    /// Archived before 2021-01-01.
    PreLlm,
    /// Archived between 2021-01-01 and 2022-11-30 inclusive.
    EarlyLlm,
    /// Archived on or after 2022-12-01.
    Recent,
}

impl TrustTier {
    /// Derive the tier from an archive timestamp.
    #[must_use]
    pub fn from_archive_date(archive_date: DateTime<Utc>) -> Self {
        let early_cutoff = NaiveDate::from_ymd_opt(2021, 1, 1).expect("valid date");
        let recent_cutoff = NaiveDate::from_ymd_opt(2022, 12, 1).expect("valid date");

        let date = archive_date.date_naive();
        if date < early_cutoff {
            Self::PreLlm
        } else if date < recent_cutoff {
            Self::EarlyLlm
        } else {
            Self::Recent
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreLlm => "pre-llm",
            Self::EarlyLlm => "early-llm",
            Self::Recent => "recent",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "pre-llm" => Ok(Self::PreLlm),
            "early-llm" => Ok(Self::EarlyLlm),
            "recent" => Ok(Self::Recent),
            other => Err(CoreError::UnknownVariant {
                kind: "trust tier",
                value: other.to_owned(),
            }),
        }
    }
}

/// Outcome of the most recent health probe of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// 2xx or 3xx response.
    Alive,
    /// 404.
    NotFound,
    /// 403.
    Forbidden,
    /// 500 and above.
    ServerError,
    /// Any other 4xx.
    Dead,
    Timeout,
    ConnectionError,
    DnsError,
    TooManyRedirects,
}

impl LinkStatus {
    /// Classify an HTTP status code. Network-level failures are classified by
    /// the prober, not here.
    #[must_use]
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=399 => Self::Alive,
            404 => Self::NotFound,
            403 => Self::Forbidden,
            500.. => Self::ServerError,
            _ => Self::Dead,
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::ServerError => "server_error",
            Self::Dead => "dead",
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::DnsError => "dns_error",
            Self::TooManyRedirects => "too_many_redirects",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "alive" => Ok(Self::Alive),
            "not_found" => Ok(Self::NotFound),
            "forbidden" => Ok(Self::Forbidden),
            "server_error" => Ok(Self::ServerError),
            "dead" => Ok(Self::Dead),
            "timeout" => Ok(Self::Timeout),
            "connection_error" => Ok(Self::ConnectionError),
            "dns_error" => Ok(Self::DnsError),
            "too_many_redirects" => Ok(Self::TooManyRedirects),
            other => Err(CoreError::UnknownVariant {
                kind: "link status",
                value: other.to_owned(),
            }),
        }
    }
}

/// A stored reference to a web resource.
///
/// `url` is unique and canonicalized at insert. `archived` mirrors the
/// existence of at least one successful Internet Archive snapshot; the
/// snapshot table is the authoritative record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub title: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
    pub status: Option<LinkStatus>,
    pub status_code: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub archived: bool,
    pub archive_url: Option<String>,
    pub archive_date: Option<DateTime<Utc>>,
    pub trust_tier: Option<TrustTier>,
    pub archive_attempts: i64,
    pub next_retry_after: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Aggregate link-health counters reported after each check batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinkHealthStats {
    pub total: i64,
    pub alive: i64,
    pub dead: i64,
    pub unchecked: i64,
}

impl LinkHealthStats {
    /// Percentage of checked-and-alive links over the whole collection.
    /// An empty collection counts as fully healthy.
    #[must_use]
    pub fn health_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.alive as f64 / self.total as f64 * 100.0
            }
        }
    }
}

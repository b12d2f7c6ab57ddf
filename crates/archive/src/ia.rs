//! Internet Archive save-endpoint client.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::{SaveOutcome, SavePageClient, SaveStatus};

const AVAILABILITY_URL: &str = "https://archive.org/wayback/available";
const SAVE_URL: &str = "https://web.archive.org/save";

/// Wayback timestamps look like `YYYYMMDDhhmmss`.
static SNAPSHOT_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/web/(\d{14})/").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestSnapshot>,
}

#[derive(Debug, Deserialize)]
struct ClosestSnapshot {
    #[serde(default)]
    available: bool,
    url: Option<String>,
    timestamp: Option<String>,
}

fn parse_wayback_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Client for the Wayback Machine availability and save endpoints.
pub struct IaClient {
    client: reqwest::Client,
    /// Optional `LOW access:secret` S3-style credential pair.
    credentials: Option<(String, String)>,
}

impl IaClient {
    pub fn new(credentials: Option<(String, String)>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("holocene/0.1 (+personal knowledge daemon)")
            .build()
            .map_err(|e| ProviderError::ExecutionFailed(e.to_string()))?;
        Ok(Self {
            client,
            credentials,
        })
    }

    /// Ask the availability endpoint whether a capture already exists.
    pub async fn check_availability(
        &self,
        url: &str,
    ) -> Result<Option<SaveOutcome>, ProviderError> {
        let response = self
            .client
            .get(AVAILABILITY_URL)
            .query(&[("url", url)])
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;

        let body: AvailabilityResponse = response.json().await?;
        let Some(closest) = body.archived_snapshots.closest else {
            return Ok(None);
        };
        if !closest.available {
            return Ok(None);
        }
        let Some(snapshot_url) = closest.url else {
            return Ok(None);
        };

        Ok(Some(SaveOutcome {
            status: SaveStatus::AlreadyArchived,
            snapshot_url,
            archive_date: closest.timestamp.as_deref().and_then(parse_wayback_timestamp),
        }))
    }
}

#[async_trait]
impl SavePageClient for IaClient {
    async fn save_url(
        &self,
        url: &str,
        force: bool,
        timeout: Duration,
    ) -> Result<SaveOutcome, ProviderError> {
        if !force {
            match self.check_availability(url).await {
                Ok(Some(existing)) => {
                    debug!(url, "already archived, skipping save");
                    return Ok(existing);
                }
                Ok(None) => {}
                // The availability endpoint is best-effort; fall through to
                // the save call on failure.
                Err(e) => debug!(url, error = %e, "availability check failed"),
            }
        }

        let mut request = self
            .client
            .get(format!("{SAVE_URL}/{url}"))
            .timeout(timeout);
        if let Some((access, secret)) = &self.credentials {
            request = request.header("Authorization", format!("LOW {access}:{secret}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message: format!("save endpoint returned {status}"),
            });
        }

        // The capture URL normally arrives in Content-Location; fall back to
        // a constructed URL stamped with the submission time.
        let content_location = response
            .headers()
            .get("Content-Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let (snapshot_url, archive_date) = match content_location {
            Some(location) => {
                let absolute = if location.starts_with("http") {
                    location.clone()
                } else {
                    format!("https://web.archive.org{location}")
                };
                let timestamp = SNAPSHOT_TIMESTAMP
                    .captures(&absolute)
                    .and_then(|c| c.get(1))
                    .and_then(|m| parse_wayback_timestamp(m.as_str()));
                (absolute, timestamp)
            }
            None => {
                let now = Utc::now();
                (
                    format!("https://web.archive.org/web/{}/{url}", now.format("%Y%m%d%H%M%S")),
                    Some(now),
                )
            }
        };

        info!(url, snapshot_url, "submitted to internet archive");
        Ok(SaveOutcome {
            status: SaveStatus::Archived,
            snapshot_url,
            archive_date: archive_date.or_else(|| Some(Utc::now())),
        })
    }
}

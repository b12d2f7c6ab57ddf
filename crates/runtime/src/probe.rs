//! HTTP probing for the link health checker.
//!
//! A probe never fails: network-level errors are folded into the outcome's
//! status so a single bad link cannot abort a batch.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use holocene_core::LinkStatus;

/// Result of probing one URL.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub status: LinkStatus,
    pub status_code: Option<i64>,
    pub response_time_ms: i64,
}

/// Probes a URL and classifies the outcome.
#[async_trait]
pub trait LinkProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Prober backed by reqwest: `HEAD` with redirect following, falling back to
/// a streamed `GET` (dropped before the body is read) when the server
/// rejects `HEAD` with 405.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; HoloceneBot/1.0)")
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    fn classify_error(err: &reqwest::Error) -> LinkStatus {
        if err.is_timeout() {
            LinkStatus::Timeout
        } else if err.is_redirect() {
            LinkStatus::TooManyRedirects
        } else if is_dns_error(err) {
            LinkStatus::DnsError
        } else {
            LinkStatus::ConnectionError
        }
    }
}

/// reqwest does not expose DNS failures as a distinct kind; match the
/// resolver's message in the error chain.
fn is_dns_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        let message = current.to_string().to_lowercase();
        if message.contains("dns") || message.contains("name or service not known") {
            return true;
        }
        source = current.source();
    }
    false
}

#[async_trait]
impl LinkProber for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let started = Instant::now();

        let response = match self.client.head(url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED => {
                // Some servers reject HEAD; issue a GET and drop the body
                // unread.
                match self.client.get(url).send().await {
                    Ok(response) => Ok(response),
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        match response {
            Ok(response) => {
                let code = response.status().as_u16();
                drop(response);
                ProbeOutcome {
                    status: LinkStatus::from_status_code(code),
                    status_code: Some(i64::from(code)),
                    response_time_ms: elapsed_ms,
                }
            }
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                ProbeOutcome {
                    status: Self::classify_error(&e),
                    status_code: None,
                    response_time_ms: elapsed_ms,
                }
            }
        }
    }
}

//! Fire-and-forget health pushes to an external monitor.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Pushes an up/down status with a short message. Failures are logged and
/// swallowed; monitoring must never destabilize the daemon.
#[async_trait]
pub trait HealthPinger: Send + Sync {
    async fn push(&self, status: &str, message: &str);
}

/// Pinger for push-monitor endpoints of the
/// `{base}/api/push/{token}?status=up&msg=...` style.
pub struct HttpPinger {
    client: reqwest::Client,
    push_url: String,
}

impl HttpPinger {
    pub fn new(push_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            push_url: push_url.into(),
        })
    }
}

#[async_trait]
impl HealthPinger for HttpPinger {
    async fn push(&self, status: &str, message: &str) {
        let result = self
            .client
            .get(&self.push_url)
            .query(&[("status", status), ("msg", message)])
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {
                debug!(status, message, "health push delivered");
            }
            Ok(response) => {
                warn!(code = %response.status(), "health push rejected");
            }
            Err(e) => {
                warn!(error = %e, "health push failed");
            }
        }
    }
}

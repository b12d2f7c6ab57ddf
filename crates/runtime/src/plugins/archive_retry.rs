//! Archive retry plugin: periodically re-runs failed snapshots whose
//! backoff deadline has passed. A manual sweep can be requested over the bus
//! on `archive.retry_requested`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};

use holocene_archive::ArchivingService;

use crate::plugin::{Plugin, PluginContext, PluginError, PluginMetadata};

const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 3600);
const MAX_ATTEMPTS: i64 = 3;

pub struct ArchiveRetryPlugin {
    archiver: Arc<ArchivingService>,
}

impl ArchiveRetryPlugin {
    #[must_use]
    pub fn new(archiver: Arc<ArchivingService>) -> Self {
        Self { archiver }
    }
}

#[async_trait]
impl Plugin for ArchiveRetryPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "archive_retry",
            version: "1.0.0",
            description: "Retries failed archive snapshots on the backoff ladder",
            runs_on: &["*"],
            requires: &[],
        }
    }

    async fn on_enable(&self, ctx: &Arc<PluginContext>) -> Result<(), PluginError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        ctx.subscribe(
            "archive.retry_requested",
            Arc::new(move |_msg| {
                tx.send(())?;
                Ok(())
            }),
        );

        let archiver = Arc::clone(&self.archiver);
        let cancel = ctx.cancellation_token();
        let bus_ctx = Arc::clone(ctx);

        ctx.spawn_worker(async move {
            info!(interval_secs = SWEEP_INTERVAL.as_secs(), "archive retry worker started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(SWEEP_INTERVAL) => {}
                    request = rx.recv() => {
                        if request.is_none() {
                            break;
                        }
                    }
                }

                match archiver.retry_failed(MAX_ATTEMPTS).await {
                    Ok(summary) if summary.retried > 0 => {
                        info!(
                            retried = summary.retried,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            "archive retry sweep complete"
                        );
                        bus_ctx.publish(
                            "archive.retry_complete",
                            serde_json::json!({
                                "retried": summary.retried,
                                "succeeded": summary.succeeded,
                                "failed": summary.failed,
                            }),
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "archive retry sweep failed"),
                }
            }
            info!("archive retry worker stopped");
        });

        Ok(())
    }
}

//! Link health checker plugin.
//!
//! Wakes on a fixed period, probes a bounded batch of stored links in
//! priority order, records the outcomes, and pushes aggregate health to an
//! external monitor. Manual checks arrive over the bus on
//! `links.check_batch` (whole batch) and `link.check_requested` (one link).

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::LinkCheckerConfig;
use crate::core::Core;
use crate::pinger::HealthPinger;
use crate::plugin::{Plugin, PluginContext, PluginError, PluginMetadata};
use crate::probe::LinkProber;

/// Daemon start settles before the first batch.
const STARTUP_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum CheckCommand {
    Batch(Option<i64>),
    Single(i64),
}

/// Counters for one batch, published as `links.batch_checked`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchStats {
    pub checked: usize,
    pub alive: usize,
    pub dead: usize,
    pub errors: usize,
}

pub struct LinkHealthPlugin {
    settings: LinkCheckerConfig,
    prober: Arc<dyn LinkProber>,
    pinger: Option<Arc<dyn HealthPinger>>,
    commands: Mutex<Option<mpsc::UnboundedSender<CheckCommand>>>,
}

impl LinkHealthPlugin {
    #[must_use]
    pub fn new(
        settings: LinkCheckerConfig,
        prober: Arc<dyn LinkProber>,
        pinger: Option<Arc<dyn HealthPinger>>,
    ) -> Self {
        Self {
            settings,
            prober,
            pinger,
            commands: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Plugin for LinkHealthPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "link_health",
            version: "2.0.0",
            description: "Monitors link health in prioritized batches",
            runs_on: &["*"],
            requires: &[],
        }
    }

    async fn on_enable(&self, ctx: &Arc<PluginContext>) -> Result<(), PluginError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.commands.lock().expect("commands lock poisoned") = Some(tx.clone());

        let batch_tx = tx.clone();
        ctx.subscribe(
            "links.check_batch",
            Arc::new(move |msg| {
                let size = msg.data.get("batch_size").and_then(serde_json::Value::as_i64);
                batch_tx.send(CheckCommand::Batch(size))?;
                Ok(())
            }),
        );

        let single_tx = tx;
        ctx.subscribe(
            "link.check_requested",
            Arc::new(move |msg| {
                if let Some(link_id) = msg.data.get("link_id").and_then(serde_json::Value::as_i64)
                {
                    single_tx.send(CheckCommand::Single(link_id))?;
                }
                Ok(())
            }),
        );

        let core = Arc::clone(ctx.core());
        let prober = Arc::clone(&self.prober);
        let pinger = self.pinger.clone();
        let settings = self.settings.clone();
        let cancel = ctx.cancellation_token();

        ctx.spawn_worker(async move {
            info!(
                interval = settings.interval_seconds,
                batch = settings.batch_size,
                "link checker worker started"
            );

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(STARTUP_DELAY) => {}
            }

            run_batch(&core, prober.as_ref(), pinger.as_deref(), &settings, &cancel, None).await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(settings.interval_seconds)) => {
                        run_batch(&core, prober.as_ref(), pinger.as_deref(), &settings, &cancel, None)
                            .await;
                    }
                    command = rx.recv() => match command {
                        Some(CheckCommand::Batch(size)) => {
                            run_batch(&core, prober.as_ref(), pinger.as_deref(), &settings, &cancel, size)
                                .await;
                        }
                        Some(CheckCommand::Single(link_id)) => {
                            check_single(&core, prober.as_ref(), link_id).await;
                        }
                        None => break,
                    }
                }
            }

            info!("link checker worker stopped");
        });

        Ok(())
    }

    async fn on_disable(&self) -> Result<(), PluginError> {
        self.commands.lock().expect("commands lock poisoned").take();
        Ok(())
    }
}

/// Run one bounded batch check. Observes `cancel` between links so shutdown
/// latency is roughly one in-flight probe.
pub(crate) async fn run_batch(
    core: &Arc<Core>,
    prober: &dyn LinkProber,
    pinger: Option<&dyn HealthPinger>,
    settings: &LinkCheckerConfig,
    cancel: &CancellationToken,
    batch_size: Option<i64>,
) -> BatchStats {
    let batch_size = batch_size.unwrap_or(settings.batch_size);
    let mut stats = BatchStats::default();

    let links = match core
        .store
        .get_links_due_for_check(batch_size, settings.recheck_days, Utc::now())
        .await
    {
        Ok(links) => links,
        Err(e) => {
            error!(error = %e, "failed to fetch links due for check");
            return stats;
        }
    };

    if links.is_empty() {
        info!("no links due for check");
        push_health(core, pinger).await;
        return stats;
    }

    info!(count = links.len(), "starting link batch check");

    for link in links {
        if cancel.is_cancelled() {
            info!("batch check interrupted by stop signal");
            break;
        }

        let outcome = prober.probe(&link.url).await;
        match core
            .store
            .update_link_check(
                link.id,
                outcome.status,
                outcome.status_code,
                Some(outcome.response_time_ms),
            )
            .await
        {
            Ok(()) => {
                stats.checked += 1;
                if outcome.status.is_alive() {
                    stats.alive += 1;
                } else {
                    stats.dead += 1;
                }
            }
            Err(e) => {
                error!(link_id = link.id, error = %e, "failed to record check result");
                stats.errors += 1;
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(Duration::from_millis(settings.delay_ms)) => {}
        }
    }

    info!(
        checked = stats.checked,
        alive = stats.alive,
        dead = stats.dead,
        errors = stats.errors,
        "link batch check complete"
    );

    core.bus.publish(
        "links.batch_checked",
        serde_json::json!({
            "checked": stats.checked,
            "alive": stats.alive,
            "dead": stats.dead,
            "errors": stats.errors,
        }),
        Some("link_health"),
    );

    push_health(core, pinger).await;
    stats
}

async fn check_single(core: &Arc<Core>, prober: &dyn LinkProber, link_id: i64) {
    let link = match core.store.get_link(link_id).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            warn!(link_id, "check requested for unknown link");
            return;
        }
        Err(e) => {
            error!(link_id, error = %e, "failed to load link");
            return;
        }
    };

    info!(link_id, url = %link.url, "checking single link");
    let outcome = prober.probe(&link.url).await;
    if let Err(e) = core
        .store
        .update_link_check(
            link.id,
            outcome.status,
            outcome.status_code,
            Some(outcome.response_time_ms),
        )
        .await
    {
        error!(link_id, error = %e, "failed to record check result");
    }
}

/// Derive aggregate health and push it to the external monitor, if any.
async fn push_health(core: &Arc<Core>, pinger: Option<&dyn HealthPinger>) {
    let Some(pinger) = pinger else {
        return;
    };

    let stats = match core.store.link_health_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "failed to compute link health stats");
            return;
        }
    };

    let percent = stats.health_percent();
    let status = if percent >= 90.0 { "up" } else { "down" };
    let message = format!("{}/{} alive ({percent:.1}%)", stats.alive, stats.total);
    pinger.push(status, &message).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use holocene_core::LinkStatus;
    use holocene_store::Store;

    use crate::config::Config;
    use crate::probe::ProbeOutcome;

    use super::*;

    struct MockProber;

    #[async_trait]
    impl LinkProber for MockProber {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            let (status, code) = if url.contains("gone") {
                (LinkStatus::NotFound, Some(404))
            } else if url.contains("slow") {
                (LinkStatus::Timeout, None)
            } else {
                (LinkStatus::Alive, Some(200))
            };
            ProbeOutcome {
                status,
                status_code: code,
                response_time_ms: 5,
            }
        }
    }

    struct MockPinger {
        pushes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl HealthPinger for MockPinger {
        async fn push(&self, status: &str, message: &str) {
            self.pushes
                .lock()
                .unwrap()
                .push((status.to_owned(), message.to_owned()));
        }
    }

    fn fast_settings() -> LinkCheckerConfig {
        LinkCheckerConfig {
            delay_ms: 0,
            ..LinkCheckerConfig::default()
        }
    }

    async fn core_with_links(count: usize) -> Arc<Core> {
        let store = Store::open_in_memory().await.unwrap();
        let core = Core::with_store(Config::default(), store);
        for i in 0..count {
            core.store
                .upsert_link(&format!("https://example.com/page{i}"), "test", None)
                .await
                .unwrap();
        }
        core
    }

    #[tokio::test]
    async fn batch_is_bounded_to_batch_size() {
        let core = core_with_links(60).await;
        let cancel = CancellationToken::new();

        let stats = run_batch(&core, &MockProber, None, &fast_settings(), &cancel, None).await;
        assert_eq!(stats.checked, 50);

        let remaining = core
            .store
            .get_links_due_for_check(100, 21, Utc::now())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 10, "exactly ten links left unchecked");
        core.shutdown().await;
    }

    #[tokio::test]
    async fn outcomes_are_recorded_and_published() {
        let core = core_with_links(0).await;
        core.store
            .upsert_link("https://example.com/ok", "test", None)
            .await
            .unwrap();
        let gone = core
            .store
            .upsert_link("https://example.com/gone", "test", None)
            .await
            .unwrap();

        let published = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&published);
        core.bus.subscribe(
            "links.batch_checked",
            Arc::new(move |msg| {
                assert_eq!(msg.data["checked"].as_u64(), Some(2));
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let cancel = CancellationToken::new();
        let stats = run_batch(&core, &MockProber, None, &fast_settings(), &cancel, None).await;
        assert_eq!(stats.checked, 2);
        assert_eq!(stats.alive, 1);
        assert_eq!(stats.dead, 1);
        assert_eq!(published.load(Ordering::SeqCst), 1);

        let link = core.store.get_link(gone.id).await.unwrap().unwrap();
        assert_eq!(link.status, Some(LinkStatus::NotFound));
        assert_eq!(link.status_code, Some(404));
        assert!(link.last_checked.is_some());
        core.shutdown().await;
    }

    #[tokio::test]
    async fn health_push_reports_percentage() {
        let core = core_with_links(0).await;
        for i in 0..9 {
            core.store
                .upsert_link(&format!("https://example.com/ok{i}"), "test", None)
                .await
                .unwrap();
        }
        core.store
            .upsert_link("https://example.com/gone", "test", None)
            .await
            .unwrap();

        let pinger = MockPinger {
            pushes: Mutex::new(Vec::new()),
        };
        let cancel = CancellationToken::new();
        run_batch(
            &core,
            &MockProber,
            Some(&pinger as &dyn HealthPinger),
            &fast_settings(),
            &cancel,
            None,
        )
        .await;

        let pushes = pinger.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        let (status, message) = &pushes[0];
        assert_eq!(status, "up");
        assert!(message.contains("9/10"));
        core.shutdown().await;
    }

    #[tokio::test]
    async fn cancellation_stops_mid_batch() {
        let core = core_with_links(20).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = run_batch(&core, &MockProber, None, &fast_settings(), &cancel, None).await;
        assert_eq!(stats.checked, 0);
        core.shutdown().await;
    }
}

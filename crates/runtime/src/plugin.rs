//! Plugin trait and the per-plugin context that makes teardown safe.
//!
//! Plugins are a closed set enumerated at build time. Each enabled plugin
//! gets a [`PluginContext`] that wraps bus subscription and worker spawning
//! so the registry can force-unsubscribe callbacks and join workers when the
//! plugin is disabled, whether or not the plugin cleans up after itself.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use holocene_bus::{Callback, SubscriptionId};
use holocene_store::StoreError;

use crate::core::Core;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Self-describing plugin metadata.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    /// Devices this plugin runs on; `"*"` matches any device.
    pub runs_on: &'static [&'static str],
    /// Plugins that must be loaded before this one.
    pub requires: &'static [&'static str],
}

impl PluginMetadata {
    #[must_use]
    pub fn runs_on_device(&self, device: &str) -> bool {
        self.runs_on.iter().any(|d| *d == "*" || *d == device)
    }
}

/// A unit of daemon functionality with a managed lifecycle:
/// `Declared -> Loaded -> Enabled <-> Disabled`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginMetadata;

    /// One-time initialization. No subscriptions or workers here.
    async fn on_load(&self, core: &Arc<Core>) -> Result<(), PluginError> {
        let _ = core;
        Ok(())
    }

    /// Subscribe to channels and start workers through `ctx`.
    async fn on_enable(&self, ctx: &Arc<PluginContext>) -> Result<(), PluginError>;

    /// Best-effort cleanup. The registry unsubscribes callbacks and joins
    /// workers afterwards regardless.
    async fn on_disable(&self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Per-enable context handed to a plugin. Records every subscription and
/// worker so the registry can tear the plugin down cleanly.
pub struct PluginContext {
    core: Arc<Core>,
    plugin_name: &'static str,
    cancel: CancellationToken,
    subscriptions: Mutex<Vec<(String, SubscriptionId)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PluginContext {
    #[must_use]
    pub fn new(core: Arc<Core>, plugin_name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            core,
            plugin_name,
            cancel: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn core(&self) -> &Arc<Core> {
        &self.core
    }

    #[must_use]
    pub fn plugin_name(&self) -> &'static str {
        self.plugin_name
    }

    /// Stop signal for this plugin's workers. Cancelled on disable.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to a bus channel, recording the subscription for teardown.
    pub fn subscribe(&self, channel: &str, callback: Callback) {
        let id = self.core.bus.subscribe(channel, callback);
        self.subscriptions
            .lock()
            .expect("context lock poisoned")
            .push((channel.to_owned(), id));
        debug!(plugin = self.plugin_name, channel, "plugin subscribed");
    }

    /// Publish on behalf of this plugin (sender is the plugin name).
    pub fn publish(&self, channel: &str, data: serde_json::Value) {
        self.core.bus.publish(channel, data, Some(self.plugin_name));
    }

    /// Spawn a long-lived worker task, recording the handle for join on
    /// disable. The worker must observe [`Self::cancellation_token`].
    pub fn spawn_worker<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.workers
            .lock()
            .expect("context lock poisoned")
            .push(handle);
        debug!(plugin = self.plugin_name, "plugin worker spawned");
    }

    /// Force-unsubscribe everything this plugin registered, cancel its stop
    /// token, and join its workers within `budget` each.
    pub async fn teardown(&self, budget: Duration) {
        let subscriptions: Vec<(String, SubscriptionId)> = {
            let mut guard = self.subscriptions.lock().expect("context lock poisoned");
            guard.drain(..).collect()
        };
        for (channel, id) in subscriptions {
            self.core.bus.unsubscribe(&channel, id);
        }

        self.cancel.cancel();

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().expect("context lock poisoned");
            guard.drain(..).collect()
        };
        for handle in workers {
            match tokio::time::timeout(budget, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(plugin = self.plugin_name, error = %e, "plugin worker panicked");
                }
                Err(_) => {
                    warn!(
                        plugin = self.plugin_name,
                        "plugin worker exceeded join budget, abandoning"
                    );
                }
            }
        }
    }
}

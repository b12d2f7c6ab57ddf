//! Plugin discovery, dependency-ordered loading, and lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::Core;
use crate::plugin::{Plugin, PluginContext};

/// Lifecycle state of a plugin. Re-enable goes straight from `Disabled` to
/// `Enabled`; there is no path back to `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Declared,
    Loaded,
    Enabled,
    Disabled,
}

/// Row returned by [`PluginRegistry::list`], rendered by the API.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub runs_on: Vec<String>,
    pub state: PluginState,
    pub enabled: bool,
}

struct Entry {
    plugin: Arc<dyn Plugin>,
    state: PluginState,
    context: Option<Arc<PluginContext>>,
}

/// Owns the plugin set for one device and drives lifecycle hooks.
pub struct PluginRegistry {
    core: Arc<Core>,
    device: String,
    /// Declaration order doubles as load order.
    entries: Mutex<Vec<Entry>>,
    /// Join budget for plugin workers at disable time.
    worker_join_budget: Duration,
}

impl PluginRegistry {
    pub const WORKER_JOIN_BUDGET: Duration = Duration::from_secs(5);

    /// Discover plugins: read metadata, filter by device, keep declaration
    /// order. Plugins filtered out are dropped entirely.
    #[must_use]
    pub fn new(core: Arc<Core>, device: &str, plugins: Vec<Arc<dyn Plugin>>) -> Arc<Self> {
        let mut entries = Vec::new();
        for plugin in plugins {
            let meta = plugin.metadata();
            if meta.runs_on_device(device) {
                info!(plugin = meta.name, "discovered plugin");
                entries.push(Entry {
                    plugin,
                    state: PluginState::Declared,
                    context: None,
                });
            } else {
                info!(
                    plugin = meta.name,
                    device,
                    runs_on = ?meta.runs_on,
                    "skipping plugin for this device"
                );
            }
        }

        Arc::new(Self {
            core,
            device: device.to_owned(),
            entries: Mutex::new(entries),
            worker_join_budget: Self::WORKER_JOIN_BUDGET,
        })
    }

    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Load all declared plugins in order. A plugin whose dependencies are
    /// not loaded, or whose `on_load` fails, is skipped; loading continues.
    pub async fn load_all(&self) {
        let mut entries = self.entries.lock().await;
        for index in 0..entries.len() {
            if entries[index].state != PluginState::Declared {
                continue;
            }
            let plugin = Arc::clone(&entries[index].plugin);
            let meta = plugin.metadata();

            let missing: Vec<&str> = meta
                .requires
                .iter()
                .filter(|dep| {
                    !entries.iter().any(|e| {
                        e.plugin.metadata().name == **dep && e.state != PluginState::Declared
                    })
                })
                .copied()
                .collect();
            if !missing.is_empty() {
                error!(plugin = meta.name, ?missing, "dependencies not loaded, skipping");
                continue;
            }

            match plugin.on_load(&self.core).await {
                Ok(()) => {
                    entries[index].state = PluginState::Loaded;
                    info!(plugin = meta.name, "plugin loaded");
                }
                Err(e) => {
                    error!(plugin = meta.name, error = %e, "plugin load failed, skipping");
                }
            }
        }
    }

    /// Enable all loaded plugins in load order.
    pub async fn enable_all(&self) {
        let names: Vec<&'static str> = {
            let entries = self.entries.lock().await;
            entries.iter().map(|e| e.plugin.metadata().name).collect()
        };
        for name in names {
            let _ = self.enable(name).await;
        }
    }

    /// Disable all plugins in reverse load order. Never fails; errors are
    /// logged so shutdown cannot be blocked.
    pub async fn disable_all(&self) {
        let names: Vec<&'static str> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .rev()
                .map(|e| e.plugin.metadata().name)
                .collect()
        };
        for name in names {
            let _ = self.disable(name).await;
        }
    }

    /// Enable one plugin. Valid from `Loaded` or `Disabled`; a failure in
    /// `on_enable` leaves the plugin `Disabled` with its partial
    /// subscriptions and workers torn down.
    pub async fn enable(&self, name: &str) -> bool {
        let (plugin, ctx) = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.iter_mut().find(|e| e.plugin.metadata().name == name)
            else {
                warn!(plugin = name, "enable requested for unknown plugin");
                return false;
            };
            match entry.state {
                PluginState::Enabled => return true,
                PluginState::Loaded | PluginState::Disabled => {}
                PluginState::Declared => {
                    warn!(plugin = name, "enable requested but plugin is not loaded");
                    return false;
                }
            }

            let ctx = PluginContext::new(Arc::clone(&self.core), entry.plugin.metadata().name);
            entry.context = Some(Arc::clone(&ctx));
            (Arc::clone(&entry.plugin), ctx)
        };

        match plugin.on_enable(&ctx).await {
            Ok(()) => {
                let mut entries = self.entries.lock().await;
                if let Some(entry) = entries.iter_mut().find(|e| e.plugin.metadata().name == name)
                {
                    entry.state = PluginState::Enabled;
                }
                info!(plugin = name, "plugin enabled");
                true
            }
            Err(e) => {
                error!(plugin = name, error = %e, "plugin enable failed");
                ctx.teardown(self.worker_join_budget).await;
                let mut entries = self.entries.lock().await;
                if let Some(entry) = entries.iter_mut().find(|e| e.plugin.metadata().name == name)
                {
                    entry.state = PluginState::Disabled;
                    entry.context = None;
                }
                false
            }
        }
    }

    /// Disable one plugin: run `on_disable` (errors logged and ignored),
    /// then force-unsubscribe its callbacks and join its workers.
    pub async fn disable(&self, name: &str) -> bool {
        let (plugin, ctx) = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.iter_mut().find(|e| e.plugin.metadata().name == name)
            else {
                warn!(plugin = name, "disable requested for unknown plugin");
                return false;
            };
            if entry.state != PluginState::Enabled {
                return true;
            }
            (Arc::clone(&entry.plugin), entry.context.take())
        };

        if let Err(e) = plugin.on_disable().await {
            warn!(plugin = name, error = %e, "plugin disable hook failed");
        }
        if let Some(ctx) = ctx {
            ctx.teardown(self.worker_join_budget).await;
        }

        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.plugin.metadata().name == name) {
            entry.state = PluginState::Disabled;
        }
        info!(plugin = name, "plugin disabled");
        true
    }

    pub async fn state(&self, name: &str) -> Option<PluginState> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .find(|e| e.plugin.metadata().name == name)
            .map(|e| e.state)
    }

    pub async fn get(&self, name: &str) -> Option<PluginInfo> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .find(|e| e.plugin.metadata().name == name)
            .map(entry_info)
    }

    pub async fn list(&self) -> Vec<PluginInfo> {
        let entries = self.entries.lock().await;
        entries.iter().map(entry_info).collect()
    }
}

fn entry_info(entry: &Entry) -> PluginInfo {
    let meta = entry.plugin.metadata();
    PluginInfo {
        name: meta.name.to_owned(),
        version: meta.version.to_owned(),
        description: meta.description.to_owned(),
        runs_on: meta.runs_on.iter().map(|s| (*s).to_owned()).collect(),
        state: entry.state,
        enabled: entry.state == PluginState::Enabled,
    }
}

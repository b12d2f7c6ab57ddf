//! The composition root plugins interact with: configuration, store, event
//! bus, and background runner, plus a late-bound reference to the plugin
//! registry so plugins can enumerate their peers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tracing::info;

use holocene_bus::EventBus;
use holocene_runner::BackgroundRunner;
use holocene_store::{Store, StoreError};

use crate::config::Config;
use crate::registry::PluginRegistry;

pub struct Core {
    pub config: Arc<Config>,
    pub store: Store,
    pub bus: Arc<EventBus>,
    pub runner: Arc<BackgroundRunner>,
    /// Set once right after the registry is constructed; weak so the
    /// registry (which holds the core) does not keep itself alive.
    registry: OnceLock<Weak<PluginRegistry>>,
    shutdown_done: AtomicBool,
}

impl Core {
    /// Open the store under the configured data directory and assemble the
    /// core services.
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        tokio::fs::create_dir_all(&config.data_dir).await.ok();
        let store = Store::open(&config.db_path()).await?;
        Ok(Self::with_store(config, store))
    }

    /// Assemble the core around an existing store. Tests use this with an
    /// in-memory store.
    #[must_use]
    pub fn with_store(config: Config, store: Store) -> Arc<Self> {
        let core = Arc::new(Self {
            config: Arc::new(config),
            store,
            bus: Arc::new(EventBus::default()),
            runner: BackgroundRunner::new(BackgroundRunner::DEFAULT_WORKERS),
            registry: OnceLock::new(),
            shutdown_done: AtomicBool::new(false),
        });
        info!("core initialized");
        core
    }

    /// Wire in the registry back-reference. Called exactly once by the
    /// daemon right after registry construction.
    pub fn set_registry(&self, registry: &Arc<PluginRegistry>) {
        let _ = self.registry.set(Arc::downgrade(registry));
    }

    /// The plugin registry, if already wired and still alive.
    #[must_use]
    pub fn registry(&self) -> Option<Arc<PluginRegistry>> {
        self.registry.get().and_then(Weak::upgrade)
    }

    /// Stop the runner and close the store. Idempotent; plugin teardown is
    /// the registry's job and happens before this.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down core");
        self.runner.shutdown().await;
        self.store.close().await;
        info!("core shutdown complete");
    }
}

//! Process supervisor: PID file, start/stop ordering, signal handling, and
//! the healthcheck ticker.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use holocene_archive::{
    ArchiveBoxClient, ArchiveBoxRemote, ArchivingService, IaClient, LocalSnapshotter,
    SavePageClient, Snapshotter,
};
use holocene_runtime::plugins::builtin_plugins;
use holocene_runtime::{Config, Core, PluginRegistry};

use crate::api::{AppState, router};
use crate::auth::AuthService;
use crate::pidfile::{PidError, PidFile, process_alive, read_pid};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Pid(#[from] PidError),

    #[error("store error: {0}")]
    Store(#[from] holocene_store::StoreError),

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

const HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The long-running daemon process.
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until SIGTERM/SIGINT. Start order: PID file, core, registry,
    /// plugins, API server, healthcheck ticker; stop order is the reverse.
    pub async fn run(self) -> Result<(), DaemonError> {
        let pidfile = PidFile::acquire(&self.config.pid_path())?;

        let result = self.run_inner().await;

        // The PID file goes last, whatever happened above.
        pidfile.release();
        result
    }

    async fn run_inner(&self) -> Result<(), DaemonError> {
        let config = self.config.clone();
        info!(device = %config.device, "starting holod");

        let core = Core::new(config.clone()).await?;

        let archiver = Arc::new(build_archiver(&core));

        let plugins = builtin_plugins(&config, Arc::clone(&archiver))?;
        let registry = PluginRegistry::new(Arc::clone(&core), &config.device, plugins);
        core.set_registry(&registry);

        registry.load_all().await;
        registry.enable_all().await;
        for plugin in registry.list().await {
            info!(plugin = %plugin.name, version = %plugin.version, enabled = plugin.enabled, "plugin ready");
        }

        let auth = Arc::new(
            AuthService::bootstrap(core.store.clone(), config.base_url.clone()).await?,
        );

        let state = AppState::new(
            Arc::clone(&core),
            Arc::clone(&registry),
            Arc::clone(&archiver),
            auth,
        );
        let app = router(state);

        let address = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|source| DaemonError::Bind {
                address: address.clone(),
                source,
            })?;
        info!(address = %address, "api server listening");

        let ticker = start_healthcheck_ticker(&config);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Reverse order: ticker, plugins, core. The API server is already
        // down once serve returns.
        info!("stopping holod");
        if let Some((cancel, handle)) = ticker {
            cancel.cancel();
            let _ = handle.await;
        }
        registry.disable_all().await;
        core.shutdown().await;
        info!("holod stopped");
        Ok(())
    }

    /// Report whether a daemon currently owns the PID file.
    #[must_use]
    pub fn status(config: &Config) -> serde_json::Value {
        let pid_path = config.pid_path();
        match read_pid(&pid_path) {
            Some(pid) if process_alive(pid) => serde_json::json!({
                "running": true,
                "pid": pid,
                "api": config.base_url,
            }),
            _ => serde_json::json!({ "running": false }),
        }
    }

    /// Signal a running daemon to stop. Returns `true` if a signal was sent.
    #[must_use]
    pub fn stop(config: &Config) -> bool {
        let Some(pid) = read_pid(&config.pid_path()) else {
            return false;
        };
        if !process_alive(pid) {
            return false;
        }

        #[cfg(unix)]
        {
            let sent = std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if sent {
                info!(pid, "sent SIGTERM to daemon");
            }
            sent
        }
        #[cfg(not(unix))]
        {
            warn!(pid, "stop is not supported on this platform");
            false
        }
    }
}

/// Assemble the archiving service from configuration.
fn build_archiver(core: &Arc<Core>) -> ArchivingService {
    let config = &core.config;
    let snapshotter: Arc<dyn Snapshotter> =
        Arc::new(LocalSnapshotter::new(config.archive_root()));

    let save_client: Option<Arc<dyn SavePageClient>> = if config.archive.use_internet_archive {
        match IaClient::new(config.archive.ia_credentials()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "internet archive client unavailable");
                None
            }
        }
    } else {
        None
    };

    let archivebox: Option<Arc<dyn ArchiveBoxRemote>> = if config.archive.use_archivebox
        && !config.archive.archivebox_host.is_empty()
    {
        Some(Arc::new(ArchiveBoxClient::new(
            config.archive.archivebox_user.clone(),
            config.archive.archivebox_host.clone(),
        )) as Arc<dyn ArchiveBoxRemote>)
    } else {
        None
    };

    ArchivingService::new(
        core.store.clone(),
        snapshotter,
        save_client,
        archivebox,
        config.archive.queue_skip_threshold,
        Duration::from_secs(config.archive.timeout_seconds),
    )
}

/// Periodic liveness ping to an external healthcheck endpoint.
fn start_healthcheck_ticker(config: &Config) -> Option<(CancellationToken, JoinHandle<()>)> {
    if config.healthcheck.url.is_empty() {
        info!("no healthcheck url configured, ticker disabled");
        return None;
    }

    let url = config.healthcheck.url.clone();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "healthcheck ticker failed to start");
                return;
            }
        };

        info!(url = %url, "healthcheck ticker started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(HEALTHCHECK_INTERVAL) => {}
            }

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "healthcheck ping rejected");
                }
                Err(e) => warn!(error = %e, "healthcheck ping failed"),
            }
        }
        info!("healthcheck ticker stopped");
    });

    Some((cancel, handle))
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

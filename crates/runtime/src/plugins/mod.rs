//! Built-in plugins. The set is closed and enumerated at build time; the
//! registry's `runs_on` filter decides which of these actually run on a
//! given device.

pub mod archive_retry;
pub mod link_health;

use std::sync::Arc;

use holocene_archive::ArchivingService;

use crate::config::Config;
use crate::pinger::{HealthPinger, HttpPinger};
use crate::plugin::Plugin;
use crate::probe::HttpProber;

pub use archive_retry::ArchiveRetryPlugin;
pub use link_health::LinkHealthPlugin;

/// Construct the built-in plugin set in declaration (= load) order.
pub fn builtin_plugins(
    config: &Config,
    archiver: Arc<ArchivingService>,
) -> Result<Vec<Arc<dyn Plugin>>, reqwest::Error> {
    let prober = Arc::new(HttpProber::new(std::time::Duration::from_secs(
        config.link_checker.request_timeout_seconds,
    ))?);

    let pinger: Option<Arc<dyn HealthPinger>> =
        if config.healthcheck.link_health_push_url.is_empty() {
            None
        } else {
            Some(Arc::new(HttpPinger::new(
                config.healthcheck.link_health_push_url.clone(),
            )?))
        };

    Ok(vec![
        Arc::new(LinkHealthPlugin::new(
            config.link_checker.clone(),
            prober,
            pinger,
        )) as Arc<dyn Plugin>,
        Arc::new(ArchiveRetryPlugin::new(archiver)) as Arc<dyn Plugin>,
    ])
}

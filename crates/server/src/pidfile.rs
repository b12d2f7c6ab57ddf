//! PID file ownership with stale-process detection.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PidError {
    /// Another live process owns the PID file.
    #[error("daemon already running with pid {0}")]
    Held(u32),

    #[error("pid file io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusive ownership of the daemon PID file for the process lifetime.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Acquire the PID file. A file naming a live process is a conflict; a
    /// file naming a dead process is stale and silently replaced.
    pub fn acquire(path: &Path) -> Result<Self, PidError> {
        if let Some(pid) = read_pid(path) {
            if process_alive(pid) {
                return Err(PidError::Held(pid));
            }
            warn!(pid, "removing stale pid file");
            std::fs::remove_file(path)?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, std::process::id().to_string())?;
        info!(path = %path.display(), pid = std::process::id(), "pid file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Remove the PID file. Idempotent; errors are logged, not raised, so
    /// shutdown cannot be blocked.
    pub fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("pid file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "failed to remove pid file"),
        }
    }
}

/// Read the PID recorded in a PID file, if it parses.
#[must_use]
pub fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Whether a process with this PID is currently running.
#[cfg(target_os = "linux")]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Whether a process with this PID is currently running.
///
/// `kill -0` probes liveness without delivering a signal.
#[cfg(all(unix, not(target_os = "linux")))]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
#[must_use]
pub fn process_alive(_pid: u32) -> bool {
    // Without a portable liveness probe, err on the side of contention.
    true
}

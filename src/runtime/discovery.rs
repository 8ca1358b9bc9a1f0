//! Locating the container runtime and helper tools on PATH.

use std::env;
use std::path::PathBuf;

use which::which;

use crate::errors::DevboxError;

pub fn container_runtime_path() -> Result<PathBuf, DevboxError> {
    // Tests and CI can force "docker missing" without touching PATH
    if env::var("DEVBOX_TEST_DISABLE_DOCKER").ok().as_deref() == Some("1") {
        return Err(DevboxError::PrerequisiteMissing(
            "docker disabled by environment override".to_string(),
        ));
    }
    which("docker").map_err(|_| {
        DevboxError::PrerequisiteMissing("docker is required but was not found in PATH".to_string())
    })
}

/// `sudo`, needed only in privileged mode.
pub fn privilege_wrapper_path() -> Result<PathBuf, DevboxError> {
    which("sudo").map_err(|_| {
        DevboxError::PrerequisiteMissing(
            "rootless docker socket not found and sudo is not installed".to_string(),
        )
    })
}

/// Optional tool lookup (nvidia-smi, systemctl, apt-get, ...).
pub fn find_tool(name: &str) -> Option<PathBuf> {
    which(name).ok()
}

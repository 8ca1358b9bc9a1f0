#![allow(clippy::module_name_repetitions)]
//! Execution mode resolution: rootless Docker vs. `sudo docker`.
//!
//! Resolution is a pure function of a `HostSnapshot`; capturing the snapshot is the
//! only I/O and happens once per process.

use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "telemetry")]
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Rootless,
    Privileged,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Rootless => f.write_str("rootless"),
            ExecutionMode::Privileged => f.write_str("privileged (sudo)"),
        }
    }
}

/// Environment facts the resolver looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub uid: u32,
    pub docker_host: Option<String>,
    pub user_socket_present: bool,
}

/// `/run/user/<uid>/docker.sock`
pub fn user_socket_path(uid: u32) -> PathBuf {
    PathBuf::from(format!("/run/user/{uid}/docker.sock"))
}

pub fn user_socket_address(uid: u32) -> String {
    format!("unix://{}", user_socket_path(uid).display())
}

#[cfg(unix)]
fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

#[cfg(unix)]
fn is_socket(p: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(p)
        .map(|m| m.file_type().is_socket())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_socket(_p: &Path) -> bool {
    false
}

impl HostSnapshot {
    pub fn capture() -> Self {
        let uid = current_uid();
        HostSnapshot {
            uid,
            docker_host: std::env::var("DOCKER_HOST")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            user_socket_present: is_socket(&user_socket_path(uid)),
        }
    }
}

/// Immutable per-process result of mode resolution. Passed explicitly to the runtime
/// wrapper and to every mutating entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub mode: ExecutionMode,
    /// `DOCKER_HOST` value to set on every runtime invocation, when the socket was found.
    pub pinned_host: Option<String>,
    /// Mutating entry points must render the privileged-mode banner first.
    pub security_warning: bool,
}

impl ExecutionContext {
    pub fn rootless(pinned_host: Option<String>) -> Self {
        ExecutionContext {
            mode: ExecutionMode::Rootless,
            pinned_host,
            security_warning: false,
        }
    }

    pub fn privileged() -> Self {
        ExecutionContext {
            mode: ExecutionMode::Privileged,
            pinned_host: None,
            security_warning: true,
        }
    }

    pub fn needs_sudo(&self) -> bool {
        self.mode == ExecutionMode::Privileged
    }
}

/// Decision rule, first match wins:
/// 1. user-scoped socket exists → rootless, pin `DOCKER_HOST` to it;
/// 2. `DOCKER_HOST` already names the user-scoped socket → rootless, keep it;
/// 3. otherwise → privileged with the security warning set.
#[cfg_attr(feature = "telemetry", instrument(level = "debug", ret))]
pub fn resolve(host: &HostSnapshot) -> ExecutionContext {
    if host.user_socket_present {
        return ExecutionContext::rootless(Some(user_socket_address(host.uid)));
    }
    let needle = user_socket_path(host.uid).display().to_string();
    if host
        .docker_host
        .as_deref()
        .is_some_and(|v| v.contains(&needle))
    {
        return ExecutionContext::rootless(None);
    }
    ExecutionContext::privileged()
}

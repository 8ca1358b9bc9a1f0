#![allow(clippy::module_name_repetitions)]
//! Container runtime seam.
//!
//! `ContainerRuntime` is the only way lifecycle code talks to Docker. `DockerCli` is the
//! real implementation; tests provide in-memory fakes.

pub mod discovery;
pub mod docker;
pub mod info;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

pub use discovery::{container_runtime_path, find_tool, privilege_wrapper_path};
pub use docker::DockerCli;
pub use info::{parse_container_state, parse_security_options, DaemonSecurity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::Absent => f.write_str("absent"),
            ContainerState::Stopped => f.write_str("stopped"),
            ContainerState::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub tag: String,
    pub file: PathBuf,
    pub context: PathBuf,
    pub build_args: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    /// Host path bind mount.
    Bind { host: PathBuf, target: String },
    /// Runtime-managed named volume (outlives the container).
    Volume { name: String, target: String },
}

/// Everything `docker run` needs to create the managed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `uid:gid`
    pub user: String,
    pub gpus: String,
    pub network: String,
    pub restart: String,
    pub shm_size: String,
    pub security_opts: Vec<String>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub workdir: String,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn volume_names(&self) -> Vec<&str> {
        self.mounts
            .iter()
            .filter_map(|m| match m {
                Mount::Volume { name, .. } => Some(name.as_str()),
                Mount::Bind { .. } => None,
            })
            .collect()
    }
}

pub trait ContainerRuntime {
    fn image_exists(&self, image: &str) -> Result<bool>;
    fn container_state(&self, name: &str) -> Result<ContainerState>;
    fn build_image(&self, request: &BuildRequest) -> Result<()>;
    /// Write the image as a tar stream into `archive`.
    fn save_image(&self, image: &str, archive: &Path) -> Result<()>;
    fn load_image(&self, archive: &Path) -> Result<()>;
    fn remove_image(&self, image: &str) -> Result<()>;
    fn create_container(&self, spec: &ContainerSpec) -> Result<()>;
    fn stop_container(&self, name: &str) -> Result<()>;
    fn remove_container(&self, name: &str) -> Result<()>;
    /// Attach an interactive command; returns its exit code.
    fn exec_interactive(&self, name: &str, user: &str, workdir: &str, command: &[String]) -> Result<i32>;
    /// Stream logs until the process is interrupted.
    fn follow_logs(&self, name: &str) -> Result<()>;
    fn volume_exists(&self, name: &str) -> Result<bool>;
    fn remove_volume(&self, name: &str) -> Result<()>;
}

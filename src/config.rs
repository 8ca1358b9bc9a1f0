#![allow(clippy::module_name_repetitions)]
//! Settings: built-in defaults, optional YAML file, `DEVBOX_*` environment overrides.
//!
//! The in-container identity is deliberately *not* configurable: it must agree with the
//! `ARG` defaults of the build definition, otherwise files created in the workspace bind
//! mount end up owned by the wrong uid on the host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::DevboxError;

/// Fixed non-root principal baked into the image and used for `--user` and `docker exec -u`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevIdentity {
    pub user: &'static str,
    pub uid: u32,
    pub gid: u32,
}

pub const DEV_IDENTITY: DevIdentity = DevIdentity {
    user: "developer",
    uid: 1000,
    gid: 1000,
};

/// Build-argument names shared with `container/Dockerfile`.
pub const BUILD_ARG_USER: &str = "USERNAME";
pub const BUILD_ARG_UID: &str = "USER_UID";
pub const BUILD_ARG_GID: &str = "USER_GID";

impl DevIdentity {
    /// The three `--build-arg` pairs passed to every image build, in a fixed order.
    pub fn build_args(&self) -> [(&'static str, String); 3] {
        [
            (BUILD_ARG_USER, self.user.to_string()),
            (BUILD_ARG_UID, self.uid.to_string()),
            (BUILD_ARG_GID, self.gid.to_string()),
        ]
    }

    pub fn home(&self) -> String {
        format!("/home/{}", self.user)
    }

    pub fn user_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

/// Optional YAML configuration file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigFile {
    pub image_name: Option<String>,
    pub image_tag: Option<String>,
    pub container_name: Option<String>,
    pub image_root: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub build_file: Option<PathBuf>,
    pub shm_size: Option<String>,
    pub settle_delay: Option<String>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, DevboxError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub image_name: String,
    pub image_tag: String,
    pub container_name: String,
    /// Directory relative paths are resolved against (default: current directory).
    pub project_dir: PathBuf,
    pub image_root: PathBuf,
    pub workspace: PathBuf,
    pub build_file: PathBuf,
    pub shm_size: String,
    pub settle_delay: Duration,
    pub identity: DevIdentity,
}

impl Settings {
    /// Defaults for a project directory and host home.
    pub fn defaults(project_dir: &Path, host_home: &Path) -> Self {
        Settings {
            image_name: "gpu-devbox".to_string(),
            image_tag: "latest".to_string(),
            container_name: "gpu-devbox".to_string(),
            project_dir: project_dir.to_path_buf(),
            image_root: project_dir.join("images"),
            workspace: host_home.join("workspace"),
            build_file: project_dir.join("container").join("Dockerfile"),
            shm_size: "16g".to_string(),
            settle_delay: Duration::from_secs(3),
            identity: DEV_IDENTITY,
        }
    }

    /// Layer a config file and then `DEVBOX_*` variables (looked up through `env`) over the defaults.
    pub fn from_sources(
        project_dir: &Path,
        host_home: &Path,
        file: Option<ConfigFile>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, DevboxError> {
        let mut s = Settings::defaults(project_dir, host_home);
        if let Some(f) = file {
            s.apply_file(f)?;
        }
        s.apply_env(env)?;
        if s.container_name.trim().is_empty() || s.image_name.trim().is_empty() {
            return Err(DevboxError::Config(
                "image and container names must not be empty".to_string(),
            ));
        }
        Ok(s)
    }

    /// Load from the process environment: `.env` in the project dir, then
    /// `$DEVBOX_CONFIG` or `<project>/devbox.yml`, then `DEVBOX_*` variables.
    pub fn load(project_dir: &Path) -> Result<Self, DevboxError> {
        let _ = dotenvy::from_path(project_dir.join(".env"));
        let host_home = home::home_dir().ok_or_else(|| {
            DevboxError::Config("could not determine the home directory".to_string())
        })?;
        let path = match std::env::var_os("DEVBOX_CONFIG") {
            Some(p) => Some(PathBuf::from(p)),
            None => Some(project_dir.join("devbox.yml")).filter(|p| p.is_file()),
        };
        let file = match path {
            Some(p) => {
                let text = std::fs::read_to_string(&p).map_err(|e| {
                    DevboxError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                Some(ConfigFile::parse(&text)?)
            }
            None => None,
        };
        let env = |k: &str| std::env::var(k).ok();
        Settings::from_sources(project_dir, &host_home, file, &env)
    }

    fn apply_file(&mut self, f: ConfigFile) -> Result<(), DevboxError> {
        if let Some(v) = f.image_name {
            self.image_name = v;
        }
        if let Some(v) = f.image_tag {
            self.image_tag = v;
        }
        if let Some(v) = f.container_name {
            self.container_name = v;
        }
        if let Some(v) = f.image_root {
            self.image_root = self.resolve(v);
        }
        if let Some(v) = f.workspace {
            self.workspace = self.resolve(v);
        }
        if let Some(v) = f.build_file {
            self.build_file = self.resolve(v);
        }
        if let Some(v) = f.shm_size {
            self.shm_size = v;
        }
        if let Some(v) = f.settle_delay {
            self.settle_delay = parse_delay(&v)?;
        }
        Ok(())
    }

    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), DevboxError> {
        let get = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(v) = get("DEVBOX_IMAGE_NAME") {
            self.image_name = v;
        }
        if let Some(v) = get("DEVBOX_IMAGE_TAG") {
            self.image_tag = v;
        }
        if let Some(v) = get("DEVBOX_CONTAINER_NAME") {
            self.container_name = v;
        }
        if let Some(v) = get("DEVBOX_IMAGE_ROOT") {
            self.image_root = self.resolve(PathBuf::from(v));
        }
        if let Some(v) = get("DEVBOX_WORKSPACE") {
            self.workspace = self.resolve(PathBuf::from(v));
        }
        if let Some(v) = get("DEVBOX_BUILD_FILE") {
            self.build_file = self.resolve(PathBuf::from(v));
        }
        if let Some(v) = get("DEVBOX_SHM_SIZE") {
            self.shm_size = v;
        }
        if let Some(v) = get("DEVBOX_SETTLE_DELAY") {
            self.settle_delay = parse_delay(&v)?;
        }
        Ok(())
    }

    fn resolve(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            p
        } else {
            self.project_dir.join(p)
        }
    }

    /// `name:tag` reference of the managed image.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    /// Build context: the directory holding the build definition.
    pub fn build_context(&self) -> PathBuf {
        self.build_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.project_dir.clone())
    }

    /// `<image-root>/<name>_<tag>.<container>.backup.tar`
    pub fn archive_path(&self) -> PathBuf {
        let stem = self.image_ref().replace(':', "_");
        self.image_root
            .join(format!("{stem}.{}.backup.tar", self.container_name))
    }

    /// Container-side mount point of the host workspace.
    pub fn workspace_mount(&self) -> String {
        format!("{}/workspace", self.identity.home())
    }

    /// Durable package-manager cache volumes and their container mount points.
    pub fn cache_volumes(&self) -> Vec<(String, String)> {
        let home = self.identity.home();
        vec![
            (
                format!("{}-apt-cache", self.container_name),
                "/var/cache/apt".to_string(),
            ),
            (
                format!("{}-apt-lists", self.container_name),
                "/var/lib/apt/lists".to_string(),
            ),
            (
                format!("{}-pip-cache", self.container_name),
                format!("{home}/.cache/pip"),
            ),
        ]
    }
}

fn parse_delay(s: &str) -> Result<Duration, DevboxError> {
    let t = s.trim();
    if let Ok(secs) = t.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(t)
        .map_err(|e| DevboxError::Config(format!("invalid settle delay '{t}': {e}")))
}

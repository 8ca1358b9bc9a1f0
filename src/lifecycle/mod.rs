#![allow(clippy::module_name_repetitions)]
//! Image and container lifecycle reconciliation.
//!
//! Each operation queries the runtime for the current state and drives it toward the
//! requested target. Operations are idempotent; composite ones stop at the first hard
//! failure and never roll back. Teardown steps in `stop_container`/`clean_all` are best
//! effort.
//!
//! The container is disposable (recreated on every start); the image, the archive and
//! the cache volumes persist until explicitly removed.

pub mod container;

use std::fs;
use std::path::PathBuf;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::color::{color_enabled_stderr, log_info_stderr};
use crate::config::Settings;
use crate::dockerfile::identity_mismatches;
use crate::errors::{one_line, DevboxError};
use crate::runtime::{BuildRequest, ContainerRuntime, ContainerState};
use crate::ui::{warn_print, Confirm};

pub use container::{container_spec, display_or_default, DEFAULT_DISPLAY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Archive written right after the build, when the save offer was accepted.
    pub saved_archive: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning,
    Started {
        loaded_from_archive: bool,
        replaced_stopped: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    pub was_running: bool,
    pub removed: bool,
}

/// Opt-ins for the durable artifacts `clean_all` leaves alone by default. Each opt-in
/// still asks for its own confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    pub purge_archive: bool,
    pub purge_volumes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub container_removed: bool,
    pub image_removed: bool,
    pub archive_removed: bool,
    pub volumes_removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub image_ref: String,
    pub image_present: bool,
    pub archive_path: PathBuf,
    pub archive_present: bool,
    pub container_name: String,
    pub container_state: ContainerState,
    pub volumes: Vec<(String, bool)>,
}

pub struct Lifecycle<'a> {
    settings: &'a Settings,
    runtime: &'a dyn ContainerRuntime,
    confirm: &'a dyn Confirm,
    display: String,
}

fn runtime_err(what: &str, e: anyhow::Error) -> String {
    format!("{what}: {}", one_line(&e))
}

impl<'a> Lifecycle<'a> {
    pub fn new(settings: &'a Settings, runtime: &'a dyn ContainerRuntime, confirm: &'a dyn Confirm) -> Self {
        Lifecycle {
            settings,
            runtime,
            confirm,
            display: DEFAULT_DISPLAY.to_string(),
        }
    }

    /// `DISPLAY` value forwarded into newly created containers.
    pub fn with_display(mut self, display: Option<String>) -> Self {
        self.display = display_or_default(display);
        self
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn build_image(&self) -> Result<BuildOutcome, DevboxError> {
        let s = self.settings;
        let definition = fs::read_to_string(&s.build_file).map_err(|_| {
            DevboxError::DefinitionMissing(format!("no build definition at {}", s.build_file.display()))
        })?;
        let mismatches = identity_mismatches(&definition, &s.identity);
        if !mismatches.is_empty() {
            return Err(DevboxError::BuildFailed(mismatches.join("; ")));
        }

        let use_err = color_enabled_stderr();
        log_info_stderr(use_err, &format!("devbox: building image {}", s.image_ref()));
        let request = BuildRequest {
            tag: s.image_ref(),
            file: s.build_file.clone(),
            context: s.build_context(),
            build_args: s
                .identity
                .build_args()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.runtime
            .build_image(&request)
            .map_err(|e| DevboxError::BuildFailed(runtime_err("docker build failed", e)))?;
        log_info_stderr(use_err, &format!("devbox: built {}", s.image_ref()));

        let question = format!(
            "save the image to {} for reuse?",
            s.archive_path().display()
        );
        let saved_archive = if self.confirm.confirm(&question, false) {
            Some(self.save_image()?)
        } else {
            None
        };
        Ok(BuildOutcome { saved_archive })
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn save_image(&self) -> Result<PathBuf, DevboxError> {
        let s = self.settings;
        let image = s.image_ref();
        let present = self
            .runtime
            .image_exists(&image)
            .map_err(|e| DevboxError::SaveFailed(runtime_err("cannot query images", e)))?;
        if !present {
            return Err(DevboxError::ImageNotBuilt(format!("image {image} not found")));
        }

        let archive = s.archive_path();
        let save_failed = |what: &str, e: std::io::Error| {
            DevboxError::SaveFailed(format!("{what} {}: {e}", archive.display()))
        };
        fs::create_dir_all(&s.image_root).map_err(|e| save_failed("cannot create directory for", e))?;

        // Staged next to the archive; the archive path only ever holds a complete tar
        let staging = tempfile::Builder::new()
            .prefix(".devbox-save-")
            .suffix(".tar")
            .tempfile_in(&s.image_root)
            .map_err(|e| save_failed("cannot stage", e))?;

        let use_err = color_enabled_stderr();
        log_info_stderr(use_err, &format!("devbox: saving {image} to {}", archive.display()));
        self.runtime
            .save_image(&image, staging.path())
            .map_err(|e| DevboxError::SaveFailed(runtime_err("docker save failed", e)))?;
        staging
            .persist(&archive)
            .map_err(|e| save_failed("cannot write", e.error))?;

        // 0666: shared by every local user of this project
        set_shared_permissions(&archive).map_err(|e| save_failed("cannot set permissions on", e))?;
        log_info_stderr(use_err, &format!("devbox: saved {}", archive.display()));
        Ok(archive)
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn load_image(&self) -> Result<PathBuf, DevboxError> {
        let archive = self.settings.archive_path();
        if !archive.is_file() {
            return Err(DevboxError::ArchiveMissing(format!(
                "no archive at {}",
                archive.display()
            )));
        }
        let use_err = color_enabled_stderr();
        log_info_stderr(use_err, &format!("devbox: loading image from {}", archive.display()));
        self.runtime
            .load_image(&archive)
            .map_err(|e| DevboxError::LoadFailed(runtime_err("docker load failed", e)))?;
        Ok(archive)
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn start_container(&self) -> Result<StartOutcome, DevboxError> {
        let s = self.settings;
        let name = &s.container_name;
        let state = self
            .runtime
            .container_state(name)
            .map_err(|e| DevboxError::StartFailed(runtime_err("cannot query container", e)))?;
        if state == ContainerState::Running {
            warn_print(&format!("container {name} is already running"));
            return Ok(StartOutcome::AlreadyRunning);
        }

        let image = s.image_ref();
        let mut loaded_from_archive = false;
        let present = self
            .runtime
            .image_exists(&image)
            .map_err(|e| DevboxError::StartFailed(runtime_err("cannot query images", e)))?;
        if !present {
            if !s.archive_path().is_file() {
                return Err(DevboxError::NoImageAvailable(format!(
                    "image {image} is not loaded and no archive exists at {}",
                    s.archive_path().display()
                )));
            }
            self.load_image()?;
            loaded_from_archive = true;
        }

        fs::create_dir_all(&s.workspace).map_err(|e| {
            DevboxError::StartFailed(format!(
                "cannot create workspace {}: {e}",
                s.workspace.display()
            ))
        })?;

        let replaced_stopped = state == ContainerState::Stopped;
        if replaced_stopped {
            // Recreate from scratch; not-found and similar errors are irrelevant here
            let _ = self.runtime.remove_container(name);
        }

        let use_err = color_enabled_stderr();
        log_info_stderr(use_err, &format!("devbox: starting container {name} from {image}"));
        let spec = container_spec(s, &self.display);
        self.runtime
            .create_container(&spec)
            .map_err(|e| DevboxError::StartFailed(runtime_err("docker run failed", e)))?;
        Ok(StartOutcome::Started {
            loaded_from_archive,
            replaced_stopped,
        })
    }

    /// Attach a login shell as the mapped user, starting the container first if needed.
    /// Returns the shell's exit code.
    pub fn enter_shell(&self) -> Result<i32, DevboxError> {
        let s = self.settings;
        let state = self
            .runtime
            .container_state(&s.container_name)
            .map_err(|e| DevboxError::StartFailed(runtime_err("cannot query container", e)))?;
        if state != ContainerState::Running {
            self.start_container()?;
            std::thread::sleep(s.settle_delay);
        }
        let command = vec!["bash".to_string(), "-l".to_string()];
        self.runtime
            .exec_interactive(
                &s.container_name,
                s.identity.user,
                &s.workspace_mount(),
                &command,
            )
            .map_err(|e| DevboxError::StartFailed(runtime_err("docker exec failed", e)))
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn stop_container(&self) -> Result<StopOutcome, DevboxError> {
        let name = &self.settings.container_name;
        let state = self
            .runtime
            .container_state(name)
            .map_err(|e| DevboxError::StopFailed(runtime_err("cannot query container", e)))?;
        let use_err = color_enabled_stderr();
        let was_running = state == ContainerState::Running;
        if was_running {
            log_info_stderr(use_err, &format!("devbox: stopping {name}"));
            self.runtime
                .stop_container(name)
                .map_err(|e| DevboxError::StopFailed(runtime_err("docker stop failed", e)))?;
        } else {
            log_info_stderr(use_err, &format!("devbox: container {name} is already stopped"));
        }

        let mut removed = false;
        if state != ContainerState::Absent
            && self
                .confirm
                .confirm(&format!("also remove container {name}?"), false)
        {
            match self.runtime.remove_container(name) {
                Ok(()) => removed = true,
                Err(e) => warn_print(&runtime_err("could not remove container", e)),
            }
        }
        Ok(StopOutcome { was_running, removed })
    }

    /// Best-effort teardown. The container always goes; the image only with confirmation;
    /// archive and volumes only when opted in *and* confirmed.
    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), ret))]
    pub fn clean_all(&self, opts: CleanOptions) -> CleanReport {
        let s = self.settings;
        let mut report = CleanReport::default();

        // An unknown state gets the full stop + remove; both are no-ops on an absent container.
        let state = match self.runtime.container_state(&s.container_name) {
            Ok(state) => Some(state),
            Err(e) => {
                warn_print(&runtime_err("cannot query container, removing it anyway", e));
                None
            }
        };
        if matches!(state, None | Some(ContainerState::Running)) {
            let _ = self.runtime.stop_container(&s.container_name);
        }
        if state != Some(ContainerState::Absent) {
            report.container_removed = self.runtime.remove_container(&s.container_name).is_ok();
        }

        let image = s.image_ref();
        if self.runtime.image_exists(&image).unwrap_or(false)
            && self.confirm.confirm(&format!("remove image {image}?"), false)
        {
            match self.runtime.remove_image(&image) {
                Ok(()) => report.image_removed = true,
                Err(e) => warn_print(&runtime_err("could not remove image", e)),
            }
        }

        let archive = s.archive_path();
        if opts.purge_archive
            && archive.is_file()
            && self
                .confirm
                .confirm(&format!("delete archive {}?", archive.display()), false)
        {
            match fs::remove_file(&archive) {
                Ok(()) => report.archive_removed = true,
                Err(e) => warn_print(&format!("could not delete {}: {e}", archive.display())),
            }
        }

        if opts.purge_volumes {
            let present: Vec<String> = s
                .cache_volumes()
                .into_iter()
                .map(|(name, _)| name)
                .filter(|name| self.runtime.volume_exists(name).unwrap_or(false))
                .collect();
            if !present.is_empty()
                && self.confirm.confirm(
                    &format!("delete cache volumes {}?", present.join(", ")),
                    false,
                )
            {
                for v in present {
                    match self.runtime.remove_volume(&v) {
                        Ok(()) => report.volumes_removed.push(v),
                        Err(e) => warn_print(&runtime_err("could not remove volume", e)),
                    }
                }
            }
        }
        report
    }

    pub fn status(&self) -> Result<LifecycleStatus, DevboxError> {
        let s = self.settings;
        let unreachable = |e| DevboxError::PrerequisiteMissing(runtime_err("container runtime not reachable", e));
        let image_ref = s.image_ref();
        let image_present = self.runtime.image_exists(&image_ref).map_err(unreachable)?;
        let container_state = self
            .runtime
            .container_state(&s.container_name)
            .map_err(unreachable)?;
        let mut volumes = Vec::new();
        for (name, _) in s.cache_volumes() {
            let exists = self.runtime.volume_exists(&name).map_err(unreachable)?;
            volumes.push((name, exists));
        }
        let archive_path = s.archive_path();
        Ok(LifecycleStatus {
            image_ref,
            image_present,
            archive_present: archive_path.is_file(),
            archive_path,
            container_name: s.container_name.clone(),
            container_state,
            volumes,
        })
    }

    pub fn show_logs(&self) -> Result<(), DevboxError> {
        let name = &self.settings.container_name;
        let state = self.runtime.container_state(name).map_err(|e| {
            DevboxError::PrerequisiteMissing(runtime_err("container runtime not reachable", e))
        })?;
        if state == ContainerState::Absent {
            return Err(DevboxError::ContainerAbsent(format!("no container named {name}")));
        }
        self.runtime
            .follow_logs(name)
            .map_err(|e| DevboxError::LogsFailed(runtime_err("docker logs failed", e)))
    }
}

#[cfg(unix)]
fn set_shared_permissions(p: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(p, fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn set_shared_permissions(_p: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

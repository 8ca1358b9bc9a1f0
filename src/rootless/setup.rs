#![allow(clippy::module_name_repetitions)]
//! Rootless Docker setup for the invoking user: prerequisites, systemd user service,
//! lingering, and the shell rc export.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::color::{color_enabled_stderr, log_info_stderr};
use crate::errors::{one_line, DevboxError};
use crate::mode::{resolve, user_socket_path, ExecutionContext, HostSnapshot};
use crate::ui::{warn_print, Confirm};
use crate::util::{shell_join, CommandRunner, ExecOutput, ExecRequest};

use super::rcblock::{contains_block, insert_block, rc_file_for, remove_block};
use super::unit::{render_unit, unit_path, UNIT_NAME};

const SERVICE_TIMEOUT: Duration = Duration::from_secs(120);
const NO_TIMEOUT: Duration = Duration::ZERO;

const APT_PACKAGES: &[&str] = &["uidmap", "dbus-user-session", "docker-ce-rootless-extras"];
const PACMAN_PACKAGES: &[&str] = &["fuse-overlayfs", "slirp4netns", "rootlesskit"];

/// Facts about the invoking user.
#[derive(Debug, Clone)]
pub struct UserEnv {
    pub home: PathBuf,
    pub user: String,
    pub uid: u32,
    pub shell: Option<String>,
}

impl UserEnv {
    #[cfg(unix)]
    pub fn capture() -> Result<Self, DevboxError> {
        let uid = nix::unistd::getuid();
        let home = home::home_dir()
            .ok_or_else(|| DevboxError::Config("could not determine the home directory".to_string()))?;
        let user = nix::unistd::User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .ok_or_else(|| DevboxError::Config("could not determine the user name".to_string()))?;
        Ok(UserEnv {
            home,
            user,
            uid: uid.as_raw(),
            shell: std::env::var("SHELL").ok(),
        })
    }

    #[cfg(not(unix))]
    pub fn capture() -> Result<Self, DevboxError> {
        Err(DevboxError::PrerequisiteMissing(
            "rootless Docker setup is only supported on Linux".to_string(),
        ))
    }

    pub fn rc_file(&self) -> PathBuf {
        rc_file_for(self.shell.as_deref(), &self.home)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub packages_installed: bool,
    pub system_daemon_disabled: bool,
    pub unit_path: PathBuf,
    pub unit_written: bool,
    pub rc_path: PathBuf,
    pub rc_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupStatus {
    pub service_state: String,
    pub unit_path: PathBuf,
    pub unit_present: bool,
    pub socket_path: PathBuf,
    pub socket_present: bool,
    pub rc_path: PathBuf,
    pub rc_block_present: bool,
    pub resolved: ExecutionContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Start,
    Stop,
    Restart,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Start => "start",
            ServiceVerb::Stop => "stop",
            ServiceVerb::Restart => "restart",
        }
    }
}

pub struct RootlessSetup<'a> {
    runner: &'a dyn CommandRunner,
    confirm: &'a dyn Confirm,
    lookup: &'a dyn Fn(&str) -> Option<PathBuf>,
    env: UserEnv,
    verbose: bool,
}

fn require(lookup: &dyn Fn(&str) -> Option<PathBuf>, tool: &str, why: &str) -> Result<PathBuf, DevboxError> {
    lookup(tool).ok_or_else(|| DevboxError::PrerequisiteMissing(format!("{tool} not found ({why})")))
}

impl<'a> RootlessSetup<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        confirm: &'a dyn Confirm,
        lookup: &'a dyn Fn(&str) -> Option<PathBuf>,
        env: UserEnv,
    ) -> Self {
        RootlessSetup {
            runner,
            confirm,
            lookup,
            env,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn user_env(&self) -> &UserEnv {
        &self.env
    }

    fn exec(&self, req: ExecRequest) -> anyhow::Result<ExecOutput> {
        if self.verbose {
            eprintln!("devbox-rootless: exec: {}", shell_join(&req.argv()));
        }
        self.runner.run(req)
    }

    fn systemctl_user(&self, systemctl: &Path, args: &[&str]) -> anyhow::Result<ExecOutput> {
        self.exec(
            ExecRequest::new(systemctl)
                .arg("--user")
                .args(args)
                .capture_output(true)
                .timeout(SERVICE_TIMEOUT),
        )
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn install(&self) -> Result<InstallReport, DevboxError> {
        if self.env.uid == 0 {
            return Err(DevboxError::Config(
                "rootless setup must be run as the non-root user who will use Docker".to_string(),
            ));
        }
        let use_err = color_enabled_stderr();
        require(self.lookup, "docker", "install Docker Engine first")?;
        let systemctl = require(self.lookup, "systemctl", "a systemd user session is required")?;

        let mut packages_installed = false;
        let dockerd = match (self.lookup)("dockerd-rootless.sh") {
            Some(p) => p,
            None => {
                self.install_packages()?;
                packages_installed = true;
                require(
                    self.lookup,
                    "dockerd-rootless.sh",
                    "rootless extras still missing after package installation",
                )?
            }
        };

        let system_daemon_disabled = self.maybe_disable_system_daemon(&systemctl);

        let unit_path = unit_path(&self.env.home);
        let unit_text = render_unit(&dockerd)
            .map_err(|e| DevboxError::ServiceFailed(format!("cannot render unit: {e}")))?;
        let unit_written = fs::read_to_string(&unit_path).ok().as_deref() != Some(unit_text.as_str());
        if unit_written {
            if let Some(parent) = unit_path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    DevboxError::ServiceFailed(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            fs::write(&unit_path, &unit_text).map_err(|e| {
                DevboxError::ServiceFailed(format!("cannot write {}: {e}", unit_path.display()))
            })?;
            log_info_stderr(use_err, &format!("devbox-rootless: wrote {}", unit_path.display()));
        }

        for args in [&["daemon-reload"][..], &["enable", "--now", UNIT_NAME][..]] {
            self.systemctl_user(&systemctl, args)
                .and_then(|o| o.check("systemctl --user"))
                .map_err(|e| {
                    DevboxError::ServiceFailed(format!("systemctl --user {}: {}", args.join(" "), one_line(&e)))
                })?;
        }
        log_info_stderr(use_err, "devbox-rootless: rootless Docker user service enabled");

        self.enable_linger();

        let rc_path = self.env.rc_file();
        let rc_updated = update_rc_file(&rc_path, |text| insert_block(text).map_err(|e| e.to_string()))?;
        if rc_updated {
            log_info_stderr(use_err, &format!("devbox-rootless: added DOCKER_HOST export to {}", rc_path.display()));
        }

        Ok(InstallReport {
            packages_installed,
            system_daemon_disabled,
            unit_path,
            unit_written,
            rc_path,
            rc_updated,
        })
    }

    fn install_packages(&self) -> Result<(), DevboxError> {
        let sudo = require(self.lookup, "sudo", "needed to install packages")?;
        let (pm, mut args): (PathBuf, Vec<&str>) = if let Some(apt) = (self.lookup)("apt-get") {
            (apt, vec!["install", "-y"])
        } else if let Some(pacman) = (self.lookup)("pacman") {
            (pacman, vec!["-S", "--needed", "--noconfirm"])
        } else {
            return Err(DevboxError::PrerequisiteMissing(
                "dockerd-rootless.sh not found and no supported package manager (apt-get, pacman)".to_string(),
            ));
        };
        let packages = if pm.ends_with("apt-get") {
            APT_PACKAGES
        } else {
            PACMAN_PACKAGES
        };
        args.extend_from_slice(packages);

        if !self.confirm.confirm(
            &format!("install rootless prerequisites ({}) with sudo?", packages.join(" ")),
            true,
        ) {
            return Err(DevboxError::PrerequisiteMissing(
                "rootless prerequisites not installed".to_string(),
            ));
        }
        self.exec(
            ExecRequest::new(&sudo)
                .arg(&pm)
                .args(args)
                .timeout(NO_TIMEOUT),
        )
        .and_then(|o| o.check("package installation"))
        .map_err(|e| DevboxError::PrerequisiteMissing(one_line(&e)))?;
        Ok(())
    }

    /// Offer to disable the rootful system daemon. Declining is fine: both can coexist.
    fn maybe_disable_system_daemon(&self, systemctl: &Path) -> bool {
        let active = self
            .exec(
                ExecRequest::new(systemctl)
                    .args(["is-active", "--quiet", UNIT_NAME])
                    .capture_output(true),
            )
            .map(|o| o.success())
            .unwrap_or(false);
        if !active
            || !self
                .confirm
                .confirm("the system-wide Docker daemon is running; disable it?", false)
        {
            return false;
        }
        let Some(sudo) = (self.lookup)("sudo") else {
            warn_print("sudo not found; leaving the system-wide daemon running");
            return false;
        };
        match self
            .exec(
                ExecRequest::new(&sudo)
                    .arg(systemctl)
                    .args(["disable", "--now", UNIT_NAME, "docker.socket"])
                    .capture_output(true)
                    .timeout(SERVICE_TIMEOUT),
            )
            .and_then(|o| o.check("systemctl disable"))
        {
            Ok(_) => true,
            Err(e) => {
                warn_print(&format!("could not disable the system daemon: {}", one_line(&e)));
                false
            }
        }
    }

    /// Keep the user service alive without an active login session (best effort).
    fn enable_linger(&self) {
        let (Some(sudo), Some(loginctl)) = ((self.lookup)("sudo"), (self.lookup)("loginctl")) else {
            warn_print("loginctl or sudo not found; the daemon stops when you log out");
            return;
        };
        let res = self
            .exec(
                ExecRequest::new(&sudo)
                    .arg(&loginctl)
                    .args(["enable-linger", self.env.user.as_str()])
                    .capture_output(true),
            )
            .and_then(|o| o.check("loginctl enable-linger"));
        if let Err(e) = res {
            warn_print(&format!("could not enable lingering: {}", one_line(&e)));
        }
    }

    pub fn status(&self, host: &HostSnapshot) -> SetupStatus {
        let service_state = (self.lookup)("systemctl")
            .and_then(|sc| self.systemctl_user(&sc, &["is-active", UNIT_NAME]).ok())
            .map(|o| o.stdout.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let unit_path = unit_path(&self.env.home);
        let socket_path = user_socket_path(self.env.uid);
        let rc_path = self.env.rc_file();
        let rc_block_present = fs::read_to_string(&rc_path)
            .map(|t| contains_block(&t))
            .unwrap_or(false);
        SetupStatus {
            service_state,
            unit_present: unit_path.is_file(),
            unit_path,
            socket_present: host.user_socket_present,
            socket_path,
            rc_path,
            rc_block_present,
            resolved: resolve(host),
        }
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn service(&self, verb: ServiceVerb) -> Result<(), DevboxError> {
        let systemctl = require(self.lookup, "systemctl", "a systemd user session is required")?;
        self.systemctl_user(&systemctl, &[verb.as_str(), UNIT_NAME])
            .and_then(|o| o.check("systemctl --user"))
            .map_err(|e| DevboxError::ServiceFailed(format!("{} {UNIT_NAME}: {}", verb.as_str(), one_line(&e))))?;
        Ok(())
    }

    /// Returns `false` when the user declined.
    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    pub fn uninstall(&self) -> Result<bool, DevboxError> {
        if !self
            .confirm
            .confirm("remove the rootless Docker user service and the shell export?", false)
        {
            return Ok(false);
        }
        if let Some(systemctl) = (self.lookup)("systemctl") {
            let _ = self.systemctl_user(&systemctl, &["disable", "--now", UNIT_NAME]);
        }
        let unit = unit_path(&self.env.home);
        if unit.exists() {
            fs::remove_file(&unit).map_err(|e| {
                DevboxError::ServiceFailed(format!("cannot remove {}: {e}", unit.display()))
            })?;
        }
        if let Some(systemctl) = (self.lookup)("systemctl") {
            let _ = self.systemctl_user(&systemctl, &["daemon-reload"]);
        }
        update_rc_file(&self.env.rc_file(), |text| Ok(remove_block(text)))?;
        Ok(true)
    }
}

/// Apply `edit` to the rc file (missing file reads as empty). Returns whether it was written.
fn update_rc_file(
    path: &Path,
    edit: impl FnOnce(&str) -> Result<Option<String>, String>,
) -> Result<bool, DevboxError> {
    let current = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(DevboxError::Config(format!("cannot read {}: {e}", path.display())));
        }
    };
    match edit(&current).map_err(DevboxError::Config)? {
        Some(updated) => {
            fs::write(path, updated)
                .map_err(|e| DevboxError::Config(format!("cannot write {}: {e}", path.display())))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ScriptedConfirm;
    use std::cell::RefCell;

    /// Records argv; commands whose argv contains `fail_on` exit 1.
    struct Recorder {
        calls: RefCell<Vec<Vec<String>>>,
        fail_on: Vec<&'static str>,
    }

    impl Recorder {
        fn new(fail_on: Vec<&'static str>) -> Self {
            Recorder {
                calls: RefCell::new(Vec::new()),
                fail_on,
            }
        }

        fn joined(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.join(" ")).collect()
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, request: ExecRequest) -> anyhow::Result<ExecOutput> {
            let argv = request.argv();
            let failed = self.fail_on.iter().any(|f| argv.iter().any(|a| a == f));
            self.calls.borrow_mut().push(argv);
            Ok(ExecOutput {
                code: Some(if failed { 1 } else { 0 }),
                stdout: "active\n".to_string(),
                ..Default::default()
            })
        }
    }

    fn user(home: &Path) -> UserEnv {
        UserEnv {
            home: home.to_path_buf(),
            user: "alice".to_string(),
            uid: 1000,
            shell: Some("/bin/bash".to_string()),
        }
    }

    fn all_tools(name: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/usr/bin/{name}")))
    }

    #[test]
    fn install_writes_unit_and_rc_block() {
        let home = tempfile::tempdir().unwrap();
        // system daemon reported inactive
        let runner = Recorder::new(vec!["--quiet"]);
        let confirm = ScriptedConfirm::blank();
        let setup = RootlessSetup::new(&runner, &confirm, &all_tools, user(home.path()));

        let report = setup.install().unwrap();
        assert!(report.unit_written && report.rc_updated);
        assert!(!report.packages_installed && !report.system_daemon_disabled);
        let unit = fs::read_to_string(home.path().join(".config/systemd/user/docker.service")).unwrap();
        assert!(unit.contains("ExecStart=/usr/bin/dockerd-rootless.sh"));
        let rc = fs::read_to_string(home.path().join(".bashrc")).unwrap();
        assert!(contains_block(&rc));

        let calls = runner.joined();
        assert!(calls.contains(&"/usr/bin/systemctl --user daemon-reload".to_string()));
        assert!(calls.contains(&"/usr/bin/systemctl --user enable --now docker.service".to_string()));
        assert!(calls.contains(&"/usr/bin/sudo /usr/bin/loginctl enable-linger alice".to_string()));
        assert!(confirm.asked().is_empty());

        // second run changes nothing on disk
        let again = setup.install().unwrap();
        assert!(!again.unit_written && !again.rc_updated);
    }

    #[test]
    fn install_keeps_system_daemon_by_default() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec![]);
        let confirm = ScriptedConfirm::blank();
        let setup = RootlessSetup::new(&runner, &confirm, &all_tools, user(home.path()));
        let report = setup.install().unwrap();
        assert!(!report.system_daemon_disabled);
        assert_eq!(confirm.asked().len(), 1);
        assert!(!runner.joined().iter().any(|c| c.contains("disable --now")));
    }

    #[test]
    fn install_without_docker_is_a_prerequisite_error() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec![]);
        let confirm = ScriptedConfirm::blank();
        let lookup = |name: &str| (name != "docker").then(|| PathBuf::from(format!("/usr/bin/{name}")));
        let setup = RootlessSetup::new(&runner, &confirm, &lookup, user(home.path()));
        let err = setup.install().unwrap_err();
        assert!(matches!(err, DevboxError::PrerequisiteMissing(_)));
        assert!(runner.joined().is_empty());
    }

    #[test]
    fn install_refuses_root() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec![]);
        let confirm = ScriptedConfirm::blank();
        let mut env = user(home.path());
        env.uid = 0;
        let setup = RootlessSetup::new(&runner, &confirm, &all_tools, env);
        assert!(matches!(setup.install(), Err(DevboxError::Config(_))));
    }

    #[test]
    fn service_failure_maps_to_service_failed() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec!["restart"]);
        let confirm = ScriptedConfirm::blank();
        let setup = RootlessSetup::new(&runner, &confirm, &all_tools, user(home.path()));
        assert!(setup.service(ServiceVerb::Start).is_ok());
        assert!(matches!(
            setup.service(ServiceVerb::Restart),
            Err(DevboxError::ServiceFailed(_))
        ));
    }

    #[test]
    fn uninstall_needs_explicit_yes() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec!["--quiet"]);
        let setup_confirm = ScriptedConfirm::blank();
        let setup = RootlessSetup::new(&runner, &setup_confirm, &all_tools, user(home.path()));
        setup.install().unwrap();

        let declined = ScriptedConfirm::blank();
        let s = RootlessSetup::new(&runner, &declined, &all_tools, user(home.path()));
        assert!(!s.uninstall().unwrap());
        assert!(home.path().join(".config/systemd/user/docker.service").exists());

        let yes = ScriptedConfirm::new(["y"]);
        let s = RootlessSetup::new(&runner, &yes, &all_tools, user(home.path()));
        assert!(s.uninstall().unwrap());
        assert!(!home.path().join(".config/systemd/user/docker.service").exists());
        let rc = fs::read_to_string(home.path().join(".bashrc")).unwrap();
        assert!(!contains_block(&rc));
    }

    #[test]
    fn status_reports_resolution() {
        let home = tempfile::tempdir().unwrap();
        let runner = Recorder::new(vec![]);
        let confirm = ScriptedConfirm::blank();
        let setup = RootlessSetup::new(&runner, &confirm, &all_tools, user(home.path()));
        let host = HostSnapshot {
            uid: 1000,
            docker_host: None,
            user_socket_present: true,
        };
        let st = setup.status(&host);
        assert_eq!(st.service_state, "active");
        assert!(!st.unit_present && !st.rc_block_present);
        assert_eq!(st.resolved.pinned_host.as_deref(), Some("unix:///run/user/1000/docker.sock"));
    }
}

#![allow(clippy::module_name_repetitions)]
//! `docker` CLI implementation of `ContainerRuntime`.
//!
//! Every invocation is an argv vector handed to a `CommandRunner`; nothing is routed
//! through a shell. In privileged mode the argv is prefixed with `sudo`; in rootless mode
//! with a pinned socket, `DOCKER_HOST` is set on the child only.

use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::info::{parse_container_state, parse_security_options, DaemonSecurity};
use super::{BuildRequest, ContainerRuntime, ContainerSpec, ContainerState, Mount};
use crate::mode::ExecutionContext;
use crate::util::{shell_join, CommandRunner, ExecOutput, ExecRequest, ExecService};

const NO_TIMEOUT: Duration = Duration::ZERO;
const STOP_TIMEOUT: Duration = Duration::from_secs(90);
/// `docker run -d` returns once the container is up; GPU hooks can make that slow.
const START_TIMEOUT: Duration = Duration::from_secs(180);

pub struct DockerCli<R: CommandRunner = ExecService> {
    runner: R,
    docker: PathBuf,
    sudo: Option<PathBuf>,
    ctx: ExecutionContext,
    verbose: bool,
}

impl<R: CommandRunner> DockerCli<R> {
    /// `sudo` must be provided when `ctx` is privileged; it is ignored otherwise.
    pub fn new(runner: R, docker: PathBuf, sudo: Option<PathBuf>, ctx: ExecutionContext) -> Self {
        DockerCli {
            runner,
            docker,
            sudo,
            ctx,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Wrap docker arguments into a request honoring the execution mode.
    pub fn request<I, S>(&self, args: I) -> ExecRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut req = match &self.sudo {
            Some(sudo) if self.privileged() => ExecRequest::new(sudo).arg(&self.docker),
            _ => ExecRequest::new(&self.docker),
        };
        req = req.args(args);
        if let Some(host) = &self.ctx.pinned_host {
            req = req.env("DOCKER_HOST", host);
        }
        req
    }

    fn privileged(&self) -> bool {
        self.sudo.is_some() && self.ctx.needs_sudo()
    }

    fn exec(&self, req: ExecRequest) -> Result<ExecOutput> {
        // sudo may be waiting on a password prompt; never cut that short.
        let req = if self.privileged() { req.timeout(NO_TIMEOUT) } else { req };
        if self.verbose {
            eprintln!("devbox: docker: {}", shell_join(&req.argv()));
        }
        self.runner.run(req)
    }

    /// Run an inspect-style query: Ok(Some(stdout)) on success, Ok(None) on "no such ...".
    fn query(&self, args: &[&str], what: &str) -> Result<Option<String>> {
        let out = self.exec(self.request(args).capture_output(true))?;
        if out.success() {
            return Ok(Some(out.stdout));
        }
        if out.stderr.to_ascii_lowercase().contains("no such") {
            return Ok(None);
        }
        out.check(what).map(|_| None)
    }

    /// `.SecurityOptions` of the daemon this process talks to.
    pub fn daemon_security(&self) -> Result<DaemonSecurity> {
        let out = self
            .exec(
                self.request(["info", "--format", "{{json .SecurityOptions}}"])
                    .capture_output(true),
            )?
            .check("docker info")?;
        parse_security_options(&out.stdout)
    }
}

pub fn build_argv(req: &BuildRequest) -> Vec<OsString> {
    let mut v: Vec<OsString> = vec!["build".into(), "-t".into(), req.tag.clone().into()];
    v.push("-f".into());
    v.push(req.file.clone().into());
    for (k, val) in &req.build_args {
        v.push("--build-arg".into());
        v.push(format!("{k}={val}").into());
    }
    v.push(req.context.clone().into());
    v
}

pub fn run_argv(spec: &ContainerSpec) -> Vec<OsString> {
    let mut v: Vec<OsString> = vec!["run".into(), "-d".into()];
    let mut flag = |k: &str, val: &str| {
        v.push(k.into());
        v.push(val.into());
    };
    flag("--name", &spec.name);
    flag("--user", &spec.user);
    flag("--gpus", &spec.gpus);
    flag("--network", &spec.network);
    flag("--restart", &spec.restart);
    flag("--shm-size", &spec.shm_size);
    for opt in &spec.security_opts {
        flag("--security-opt", opt);
    }
    for (k, val) in &spec.env {
        flag("-e", &format!("{k}={val}"));
    }
    for m in &spec.mounts {
        match m {
            Mount::Bind { host, target } => {
                flag("-v", &format!("{}:{target}", host.display()));
            }
            Mount::Volume { name, target } => flag("-v", &format!("{name}:{target}")),
        }
    }
    flag("-w", &spec.workdir);
    v.push(spec.image.clone().into());
    v.extend(spec.command.iter().map(OsString::from));
    v
}

pub fn exec_argv(name: &str, user: &str, workdir: &str, command: &[String], tty: bool) -> Vec<OsString> {
    let tty_flag = if tty { "-it" } else { "-i" };
    let mut v: Vec<OsString> = vec![OsString::from("exec"), OsString::from(tty_flag)];
    for a in ["-u", user, "-w", workdir, name] {
        v.push(OsString::from(a));
    }
    v.extend(command.iter().map(OsString::from));
    v
}

impl<R: CommandRunner> ContainerRuntime for DockerCli<R> {
    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self
            .query(&["image", "inspect", "--format", "{{.Id}}", image], "docker image inspect")?
            .is_some())
    }

    fn container_state(&self, name: &str) -> Result<ContainerState> {
        match self.query(
            &["container", "inspect", "--format", "{{json .State}}", name],
            "docker container inspect",
        )? {
            Some(raw) => parse_container_state(&raw),
            None => Ok(ContainerState::Absent),
        }
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    fn build_image(&self, request: &BuildRequest) -> Result<()> {
        self.exec(self.request(build_argv(request)).timeout(NO_TIMEOUT))?
            .check("docker build")?;
        Ok(())
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    fn save_image(&self, image: &str, archive: &Path) -> Result<()> {
        let file = File::create(archive)
            .with_context(|| format!("cannot create {}", archive.display()))?;
        let req = self
            .request(["save", image])
            .stdout_to(file)
            .capture_output(true)
            .timeout(NO_TIMEOUT);
        self.exec(req)?.check("docker save")?;
        Ok(())
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self), err))]
    fn load_image(&self, archive: &Path) -> Result<()> {
        let args: Vec<OsString> = vec!["load".into(), "-i".into(), archive.into()];
        self.exec(self.request(args).timeout(NO_TIMEOUT))?
            .check("docker load")?;
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.exec(self.request(["image", "rm", image]).capture_output(true))?
            .check("docker image rm")?;
        Ok(())
    }

    #[cfg_attr(feature = "telemetry", instrument(level = "info", skip(self, spec), fields(container = %spec.name), err))]
    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.exec(
            self.request(run_argv(spec))
                .capture_output(true)
                .timeout(START_TIMEOUT),
        )?
            .check("docker run")?;
        Ok(())
    }

    fn stop_container(&self, name: &str) -> Result<()> {
        self.exec(
            self.request(["stop", name])
                .capture_output(true)
                .timeout(STOP_TIMEOUT),
        )?
        .check("docker stop")?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.exec(self.request(["rm", "-f", name]).capture_output(true))?
            .check("docker rm")?;
        Ok(())
    }

    fn exec_interactive(&self, name: &str, user: &str, workdir: &str, command: &[String]) -> Result<i32> {
        let tty = atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout);
        let out = self.exec(
            self.request(exec_argv(name, user, workdir, command, tty))
                .timeout(NO_TIMEOUT),
        )?;
        Ok(out.code.unwrap_or(1))
    }

    fn follow_logs(&self, name: &str) -> Result<()> {
        self.exec(
            self.request(["logs", "-f", name])
                .timeout(NO_TIMEOUT),
        )?
        .check("docker logs")?;
        Ok(())
    }

    fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .query(&["volume", "inspect", "--format", "{{.Name}}", name], "docker volume inspect")?
            .is_some())
    }

    fn remove_volume(&self, name: &str) -> Result<()> {
        self.exec(self.request(["volume", "rm", name]).capture_output(true))?
            .check("docker volume rm")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records argv/env of every request and replies with a canned output.
    struct Recorder {
        calls: RefCell<Vec<(Vec<String>, Vec<(String, String)>)>>,
        timeouts: RefCell<Vec<Option<Duration>>>,
        reply: ExecOutput,
    }

    impl Recorder {
        fn replying(code: i32, stdout: &str, stderr: &str) -> Self {
            Recorder {
                calls: RefCell::new(Vec::new()),
                timeouts: RefCell::new(Vec::new()),
                reply: ExecOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    ..ExecOutput::default()
                },
            }
        }
    }

    impl CommandRunner for &Recorder {
        fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
            let env = request
                .env_list()
                .iter()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
                .collect();
            self.timeouts.borrow_mut().push(request.timeout_override());
            self.calls.borrow_mut().push((request.argv(), env));
            Ok(self.reply.clone())
        }
    }

    fn cli(rec: &Recorder, ctx: ExecutionContext) -> DockerCli<&Recorder> {
        DockerCli::new(
            rec,
            PathBuf::from("/usr/bin/docker"),
            Some(PathBuf::from("/usr/bin/sudo")),
            ctx,
        )
    }

    #[test]
    fn privileged_mode_prefixes_sudo() {
        let rec = Recorder::replying(0, "sha256:abc", "");
        let d = cli(&rec, ExecutionContext::privileged());
        assert!(d.image_exists("gpu-devbox:latest").unwrap());
        let calls = rec.calls.borrow();
        assert_eq!(calls[0].0[0], "/usr/bin/sudo");
        assert_eq!(calls[0].0[1], "/usr/bin/docker");
        assert_eq!(calls[0].0[2], "image");
        assert!(calls[0].1.is_empty());
    }

    #[test]
    fn rootless_pin_sets_docker_host_only_on_child() {
        let rec = Recorder::replying(0, "", "");
        let host = "unix:///run/user/1000/docker.sock".to_string();
        let d = cli(&rec, ExecutionContext::rootless(Some(host.clone())));
        d.stop_container("gpu-devbox").unwrap();
        let calls = rec.calls.borrow();
        assert_eq!(calls[0].0, vec!["/usr/bin/docker", "stop", "gpu-devbox"]);
        assert_eq!(calls[0].1, vec![("DOCKER_HOST".to_string(), host)]);
    }

    #[test]
    fn missing_container_is_absent() {
        let rec = Recorder::replying(1, "", "Error: No such container: gpu-devbox\n");
        let d = cli(&rec, ExecutionContext::rootless(None));
        assert_eq!(d.container_state("gpu-devbox").unwrap(), ContainerState::Absent);
    }

    #[test]
    fn daemon_unreachable_is_an_error_not_absent() {
        let rec = Recorder::replying(1, "", "permission denied while trying to connect to the Docker daemon socket\n");
        let d = cli(&rec, ExecutionContext::rootless(None));
        let err = d.image_exists("gpu-devbox:latest").unwrap_err();
        assert!(err.to_string().contains("permission denied"), "{err}");
    }

    #[test]
    fn build_argv_carries_identity_args_before_context() {
        let req = BuildRequest {
            tag: "gpu-devbox:latest".to_string(),
            file: PathBuf::from("/p/container/Dockerfile"),
            context: PathBuf::from("/p/container"),
            build_args: vec![
                ("USERNAME".to_string(), "developer".to_string()),
                ("USER_UID".to_string(), "1000".to_string()),
                ("USER_GID".to_string(), "1000".to_string()),
            ],
        };
        let argv: Vec<String> = build_argv(&req)
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            argv,
            vec![
                "build",
                "-t",
                "gpu-devbox:latest",
                "-f",
                "/p/container/Dockerfile",
                "--build-arg",
                "USERNAME=developer",
                "--build-arg",
                "USER_UID=1000",
                "--build-arg",
                "USER_GID=1000",
                "/p/container",
            ]
        );
    }

    #[test]
    fn exec_argv_uses_tty_only_when_asked() {
        let cmd = vec!["bash".to_string(), "-l".to_string()];
        let argv: Vec<String> = exec_argv("box", "developer", "/home/developer/workspace", &cmd, false)
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            argv,
            vec!["exec", "-i", "-u", "developer", "-w", "/home/developer/workspace", "box", "bash", "-l"]
        );
    }

    #[test]
    fn save_streams_into_archive_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("img.tar");
        let rec = Recorder::replying(0, "", "");
        let d = cli(&rec, ExecutionContext::privileged());
        d.save_image("gpu-devbox:latest", &archive).unwrap();
        assert!(archive.exists());
        let calls = rec.calls.borrow();
        assert_eq!(
            calls[0].0,
            vec!["/usr/bin/sudo", "/usr/bin/docker", "save", "gpu-devbox:latest"]
        );
    }

    #[test]
    fn logs_follow_the_whole_log() {
        let rec = Recorder::replying(0, "", "");
        let d = cli(&rec, ExecutionContext::rootless(None));
        d.follow_logs("gpu-devbox").unwrap();
        assert_eq!(rec.calls.borrow()[0].0, vec!["/usr/bin/docker", "logs", "-f", "gpu-devbox"]);
        assert_eq!(rec.timeouts.borrow()[0], Some(NO_TIMEOUT));
    }

    #[test]
    fn privileged_calls_wait_for_sudo() {
        let rec = Recorder::replying(0, "sha256:abc", "");
        let d = cli(&rec, ExecutionContext::privileged());
        d.image_exists("gpu-devbox:latest").unwrap();
        let _ = d.container_state("gpu-devbox");
        d.stop_container("gpu-devbox").unwrap();
        d.remove_container("gpu-devbox").unwrap();
        let timeouts = rec.timeouts.borrow();
        assert_eq!(timeouts.len(), 4);
        assert!(timeouts.iter().all(|t| *t == Some(NO_TIMEOUT)), "{timeouts:?}");
    }

    #[test]
    fn rootless_queries_keep_the_default_timeout() {
        let rec = Recorder::replying(0, "sha256:abc", "");
        let d = cli(&rec, ExecutionContext::rootless(None));
        d.image_exists("gpu-devbox:latest").unwrap();
        d.stop_container("gpu-devbox").unwrap();
        assert_eq!(*rec.timeouts.borrow(), vec![None, Some(STOP_TIMEOUT)]);
    }
}

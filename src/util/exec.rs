use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use wait_timeout::ChildExt;

/// Anything that can execute an `ExecRequest`. Implemented by `ExecService` for real
/// process spawning; tests substitute recording runners.
pub trait CommandRunner {
    fn run(&self, request: ExecRequest) -> Result<ExecOutput>;
}

/// Structured command execution with timeouts. Arguments are always passed as a vector,
/// never through a shell.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl CommandRunner for ExecService {
    fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);

        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        if let Some(file) = request.stdout_file {
            cmd.stdout(Stdio::from(file));
            if request.capture_output {
                cmd.stderr(Stdio::piped());
            }
        } else if request.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(anyhow!(
                        "command {:?} timed out after {}",
                        request.program,
                        humantime::format_duration(timeout)
                    ));
                }
            }
        };

        let duration = started.elapsed();
        let stdout = read_stream(stdout_pipe.as_mut())?;
        let stderr = read_stream(stderr_pipe.as_mut())?;

        Ok(ExecOutput {
            code: status.code(),
            duration,
            stdout,
            stderr,
        })
    }
}

fn read_stream(stream: Option<&mut impl io::Read>) -> Result<String> {
    let mut buf = String::new();
    if let Some(reader) = stream {
        reader
            .read_to_string(&mut buf)
            .context("failed to read process output")?;
    }
    Ok(buf)
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[derive(Debug, Default)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
    capture_output: bool,
    stdout_file: Option<File>,
}

impl ExecRequest {
    /// New request; the child inherits the parent environment and stdio.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Zero disables the timeout (interactive sessions, builds, log follows).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Redirect the child's stdout into `file` (stderr is captured when `capture_output` is set).
    pub fn stdout_to(mut self, file: File) -> Self {
        self.stdout_file = Some(file);
        self
    }

    pub fn env_list(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Explicit timeout, if any; `None` falls back to the service default.
    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Program followed by arguments, lossily converted for previews and assertions.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convert a non-zero exit into an error naming `what`, carrying stderr's last line.
    pub fn check(self, what: &str) -> Result<ExecOutput> {
        if self.success() {
            return Ok(self);
        }
        let code = self
            .code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        match self.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(last) => Err(anyhow!("{what} exited with {code}: {}", last.trim())),
            None => Err(anyhow!("{what} exited with {code}")),
        }
    }
}

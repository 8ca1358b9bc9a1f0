use std::path::PathBuf;
use std::process::ExitCode;

use gpu_devbox::color::{color_enabled_stdout, paint, BOLD_BLUE, DIM, GREEN, YELLOW};
use gpu_devbox::lifecycle::{BuildOutcome, CleanOptions, Lifecycle, StartOutcome, StopOutcome};
use gpu_devbox::runtime::{container_runtime_path, find_tool, privilege_wrapper_path, DockerCli};
use gpu_devbox::ui::{render_security_banner, TerminalConfirm};
use gpu_devbox::util::{ExecService, TextLines};
use gpu_devbox::{
    color_enabled_stderr, log_error_stderr, log_info_stderr, resolve, DevboxError,
    ExecutionContext, HostSnapshot, Settings,
};

use crate::cli::{Cli, Command};

/// Print the labeled error line plus hint and map to the process exit code.
pub(crate) fn report_error(e: &DevboxError) -> ExitCode {
    let use_err = color_enabled_stderr();
    log_error_stderr(use_err, &format!("devbox: error: {e}"));
    if let Some(h) = e.hint() {
        eprintln!("devbox: hint: {h}");
    }
    ExitCode::from(e.exit_code())
}

fn project_dir(cli: &Cli) -> Result<PathBuf, DevboxError> {
    match &cli.project_dir {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir()
            .map_err(|e| DevboxError::Config(format!("cannot determine current directory: {e}"))),
    }
}

fn docker_for(ctx: &ExecutionContext, verbose: bool) -> Result<DockerCli, DevboxError> {
    let docker = container_runtime_path()?;
    let sudo = if ctx.needs_sudo() {
        Some(privilege_wrapper_path()?)
    } else {
        None
    };
    Ok(DockerCli::new(ExecService::default(), docker, sudo, ctx.clone()).verbose(verbose))
}

fn require_gpu_driver() -> Result<(), DevboxError> {
    find_tool("nvidia-smi").map(|_| ()).ok_or_else(|| {
        DevboxError::PrerequisiteMissing(
            "nvidia-smi not found; the NVIDIA driver and container toolkit are required".to_string(),
        )
    })
}

pub(crate) fn dispatch(cli: &Cli) -> ExitCode {
    match run(cli) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

fn run(cli: &Cli) -> Result<ExitCode, DevboxError> {
    let settings = Settings::load(&project_dir(cli)?)?;
    let host = HostSnapshot::capture();
    let ctx = resolve(&host);

    if cli.command.is_mutating() {
        render_security_banner(&ctx);
    }
    if cli.verbose {
        eprintln!("devbox: mode: {}", ctx.mode);
    }
    let runtime = docker_for(&ctx, cli.verbose)?;
    if cli.command.needs_gpu() {
        require_gpu_driver()?;
    }
    let confirm = TerminalConfirm;
    let lc = Lifecycle::new(&settings, &runtime, &confirm).with_display(std::env::var("DISPLAY").ok());
    let use_err = color_enabled_stderr();

    match &cli.command {
        Command::Build => {
            let BuildOutcome { saved_archive } = lc.build_image()?;
            if saved_archive.is_none() {
                log_info_stderr(use_err, "devbox: image not archived; run `devbox save` later to keep a copy");
            }
        }
        Command::Save => {
            lc.save_image()?;
        }
        Command::Load => {
            lc.load_image()?;
            log_info_stderr(use_err, &format!("devbox: loaded {}", settings.image_ref()));
        }
        Command::Start => {
            if let StartOutcome::Started { .. } = lc.start_container()? {
                log_info_stderr(use_err, &format!("devbox: container {} is running", settings.container_name));
            }
        }
        Command::Run => {
            let code = lc.enter_shell()?;
            return Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)));
        }
        Command::Stop => {
            let StopOutcome { removed, .. } = lc.stop_container()?;
            if removed {
                log_info_stderr(use_err, &format!("devbox: removed container {}", settings.container_name));
            }
        }
        Command::Clean {
            purge_archive,
            purge_volumes,
        } => {
            let report = lc.clean_all(CleanOptions {
                purge_archive: *purge_archive,
                purge_volumes: *purge_volumes,
            });
            let mut done = Vec::new();
            if report.container_removed {
                done.push(format!("container {}", settings.container_name));
            }
            if report.image_removed {
                done.push(format!("image {}", settings.image_ref()));
            }
            if report.archive_removed {
                done.push(format!("archive {}", settings.archive_path().display()));
            }
            done.extend(report.volumes_removed.iter().map(|v| format!("volume {v}")));
            if done.is_empty() {
                log_info_stderr(use_err, "devbox: clean: nothing removed");
            } else {
                log_info_stderr(use_err, &format!("devbox: clean: removed {}", done.join(", ")));
            }
        }
        Command::Logs => lc.show_logs()?,
        Command::Status { porcelain } => return run_status(cli, &lc, &runtime, *porcelain),
    }
    Ok(ExitCode::SUCCESS)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn run_status(
    cli: &Cli,
    lc: &Lifecycle<'_>,
    runtime: &DockerCli,
    porcelain: bool,
) -> Result<ExitCode, DevboxError> {
    let st = lc.status()?;
    let gpu = find_tool("nvidia-smi").is_some();
    let ctx = runtime.context();
    let docker_host = match (&ctx.pinned_host, ctx.needs_sudo()) {
        (Some(h), _) => h.clone(),
        (None, false) => "(inherited DOCKER_HOST)".to_string(),
        (None, true) => "(system daemon via sudo)".to_string(),
    };

    let mut rows: Vec<(String, String)> = vec![
        ("mode".to_string(), ctx.mode.to_string()),
        ("docker_host".to_string(), docker_host),
        ("image".to_string(), st.image_ref.clone()),
        ("image_present".to_string(), yes_no(st.image_present).to_string()),
        ("archive".to_string(), st.archive_path.display().to_string()),
        ("archive_present".to_string(), yes_no(st.archive_present).to_string()),
        ("container".to_string(), st.container_name.clone()),
        ("container_state".to_string(), st.container_state.to_string()),
        ("gpu_driver".to_string(), yes_no(gpu).to_string()),
    ];
    rows.extend(
        st.volumes
            .iter()
            .map(|(name, present)| (format!("volume.{name}"), yes_no(*present).to_string())),
    );

    if cli.verbose {
        match runtime.daemon_security() {
            Ok(sec) => {
                rows.push(("daemon_rootless".to_string(), yes_no(sec.rootless).to_string()));
                rows.push(("daemon_seccomp".to_string(), sec.seccomp_profile));
                rows.push(("daemon_cgroupns".to_string(), sec.cgroupns_mode));
            }
            Err(e) => {
                rows.push(("daemon_security".to_string(), format!("(unavailable: {})", gpu_devbox::one_line(&e))));
            }
        }
        rows.push(("version".to_string(), env!("CARGO_PKG_VERSION").to_string()));
        rows.push(("build_date".to_string(), env!("DEVBOX_BUILD_DATE").to_string()));
        rows.push(("build_target".to_string(), env!("DEVBOX_BUILD_TARGET").to_string()));
        rows.push(("build_profile".to_string(), env!("DEVBOX_BUILD_PROFILE").to_string()));
        rows.push(("build_rustc".to_string(), env!("DEVBOX_BUILD_RUSTC").to_string()));
    }

    if porcelain {
        let mut t = TextLines::new();
        for (k, v) in &rows {
            t.push(format!("{k}={v}"));
        }
        let text = t
            .build()
            .map_err(|e| DevboxError::Config(format!("cannot render status: {e}")))?;
        print!("{text}");
        return Ok(ExitCode::SUCCESS);
    }

    let use_out = color_enabled_stdout();
    println!("devbox status");
    for (k, v) in &rows {
        let code = match v.as_str() {
            "yes" | "running" | "rootless" => GREEN,
            "no" | "absent" | "privileged (sudo)" => YELLOW,
            _ => BOLD_BLUE,
        };
        println!("  {} {}", paint(use_out, DIM, &format!("{k:<16}")), paint(use_out, code, v));
    }
    Ok(ExitCode::SUCCESS)
}

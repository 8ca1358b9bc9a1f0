use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gpu_devbox::color::{color_enabled_stdout, paint, GREEN, YELLOW};
use gpu_devbox::rootless::{RootlessSetup, ServiceVerb, UserEnv};
use gpu_devbox::runtime::find_tool;
use gpu_devbox::ui::TerminalConfirm;
use gpu_devbox::util::ExecService;
use gpu_devbox::{color_enabled_stderr, log_error_stderr, log_info_stderr, DevboxError, HostSnapshot};

#[derive(Parser, Debug)]
#[command(
    name = "devbox-rootless",
    version,
    about = "Set up and manage a rootless Docker daemon for the current user.",
    arg_required_else_help = true
)]
struct Cli {
    /// Print every command before running it
    #[arg(long, global = true)]
    verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    color: Option<gpu_devbox::ColorMode>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Cmd {
    /// Install prerequisites, enable the user service and export DOCKER_HOST in your shell rc
    Install,
    /// Show service, unit, socket and shell rc state
    Status,
    /// Start the user daemon
    Start,
    /// Stop the user daemon
    Stop,
    /// Restart the user daemon
    Restart,
    /// Disable the user service and remove the unit and rc export (data is kept)
    Uninstall,
}

fn report_error(e: &DevboxError) -> ExitCode {
    log_error_stderr(color_enabled_stderr(), &format!("devbox-rootless: error: {e}"));
    if let Some(h) = e.hint() {
        eprintln!("devbox-rootless: hint: {h}");
    }
    ExitCode::from(e.exit_code())
}

fn mark(use_color: bool, ok: bool) -> String {
    if ok {
        paint(use_color, GREEN, "yes")
    } else {
        paint(use_color, YELLOW, "no")
    }
}

fn run(cli: &Cli) -> Result<(), DevboxError> {
    let runner = ExecService::default();
    let confirm = TerminalConfirm;
    let setup = RootlessSetup::new(&runner, &confirm, &find_tool, UserEnv::capture()?).verbose(cli.verbose);
    let use_err = color_enabled_stderr();

    match cli.command {
        Cmd::Install => {
            let report = setup.install()?;
            log_info_stderr(use_err, "devbox-rootless: rootless Docker is set up");
            if report.rc_updated {
                eprintln!(
                    "devbox-rootless: open a new shell or run `source {}` to pick up DOCKER_HOST",
                    report.rc_path.display()
                );
            }
        }
        Cmd::Status => {
            let st = setup.status(&HostSnapshot::capture());
            let use_out = color_enabled_stdout();
            println!("service:   {}", st.service_state);
            println!("unit:      {} ({})", mark(use_out, st.unit_present), st.unit_path.display());
            println!("socket:    {} ({})", mark(use_out, st.socket_present), st.socket_path.display());
            println!("rc export: {} ({})", mark(use_out, st.rc_block_present), st.rc_path.display());
            println!("devbox mode: {}", st.resolved.mode);
        }
        Cmd::Start => setup.service(ServiceVerb::Start)?,
        Cmd::Stop => setup.service(ServiceVerb::Stop)?,
        Cmd::Restart => setup.service(ServiceVerb::Restart)?,
        Cmd::Uninstall => {
            if setup.uninstall()? {
                log_info_stderr(use_err, "devbox-rootless: user service and rc export removed");
                eprintln!(
                    "devbox-rootless: images and containers under {} were left in place",
                    setup.user_env().home.join(".local/share/docker").display()
                );
            } else {
                log_info_stderr(use_err, "devbox-rootless: uninstall cancelled");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    if let Some(mode) = cli.color {
        gpu_devbox::set_color_mode(mode);
    }
    let _ = gpu_devbox::telemetry_init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;

use cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            // help/version print to stdout and succeed; usage errors exit 1, not clap's 2
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    if let Some(mode) = cli.color {
        gpu_devbox::set_color_mode(mode);
    }
    let _ = gpu_devbox::telemetry_init();

    commands::dispatch(&cli)
}

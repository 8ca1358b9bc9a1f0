#![allow(clippy::module_name_repetitions)]
//! Color mode resolution and ANSI painting helpers.
//!
//! Logging policy (stderr one-liners):
//! - Status and progress go to stderr through `log_info_stderr`, `log_warn_stderr` and
//!   `log_error_stderr`; stdout is reserved for machine-readable output (`status --porcelain`).
//! - Compute `color_enabled_stderr()` once per function and reuse it.
//! - Precedence: `NO_COLOR` > `--color` > `DEVBOX_COLOR` > TTY detection.

use clap::ValueEnum;
use once_cell::sync::OnceCell;

pub const BOLD_CYAN: &str = "\x1b[36;1m";
pub const YELLOW: &str = "\x1b[33m";
pub const BOLD_RED: &str = "\x1b[31;1m";
pub const BOLD_BLUE: &str = "\x1b[34;1m";
pub const GREEN: &str = "\x1b[32m";
pub const DIM: &str = "\x1b[90m";

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

static COLOR_MODE: OnceCell<ColorMode> = OnceCell::new();

/// Record the CLI's `--color` choice; first call wins.
pub fn set_color_mode(mode: ColorMode) {
    let _ = COLOR_MODE.set(mode);
}

fn parse_color_mode(s: &str) -> Option<ColorMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ColorMode::Auto),
        "always" | "on" | "true" | "yes" | "1" => Some(ColorMode::Always),
        "never" | "off" | "false" | "no" | "0" => Some(ColorMode::Never),
        _ => None,
    }
}

fn resolve(no_color: bool, cli: Option<ColorMode>, env: Option<ColorMode>, is_tty: bool) -> bool {
    // https://no-color.org/
    if no_color {
        return false;
    }
    match cli.or(env).unwrap_or(ColorMode::Auto) {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => is_tty,
    }
}

fn color_enabled_for(is_tty: bool) -> bool {
    let env_pref = std::env::var("DEVBOX_COLOR")
        .ok()
        .and_then(|v| parse_color_mode(&v));
    resolve(
        std::env::var_os("NO_COLOR").is_some(),
        COLOR_MODE.get().copied(),
        env_pref,
        is_tty,
    )
}

pub fn color_enabled_stdout() -> bool {
    color_enabled_for(atty::is(atty::Stream::Stdout))
}

pub fn color_enabled_stderr() -> bool {
    color_enabled_for(atty::is(atty::Stream::Stderr))
}

/// Wrap string with ANSI color code when enabled; otherwise return unchanged.
pub fn paint(enabled: bool, code: &str, s: &str) -> String {
    if enabled {
        format!("{code}{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, BOLD_CYAN, msg));
}

pub fn log_warn_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, YELLOW, msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, BOLD_RED, msg));
}

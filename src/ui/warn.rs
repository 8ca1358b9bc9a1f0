use crate::color::{color_enabled_stderr, log_warn_stderr, paint, BOLD_RED, YELLOW};
use crate::mode::ExecutionContext;

/// Print a standardized warning line to stderr (color-aware).
pub fn warn_print(msg: &str) {
    log_warn_stderr(color_enabled_stderr(), &format!("warning: {msg}"));
}

/// Banner lines for privileged mode; `None` when no warning applies.
pub fn security_banner_lines(ctx: &ExecutionContext) -> Option<Vec<String>> {
    if !ctx.security_warning {
        return None;
    }
    Some(vec![
        "SECURITY WARNING: rootless Docker was not detected.".to_string(),
        "Docker commands will run through sudo against the system-wide daemon.".to_string(),
        "Containers started this way are root-equivalent on this host and visible to every docker user.".to_string(),
        "Set up rootless Docker with: devbox-rootless install".to_string(),
    ])
}

/// Render the privileged-mode banner before a mutating action. Not suppressible.
pub fn render_security_banner(ctx: &ExecutionContext) {
    let Some(lines) = security_banner_lines(ctx) else {
        return;
    };
    let use_err = color_enabled_stderr();
    let rule = "─".repeat(78);
    eprintln!("{}", paint(use_err, BOLD_RED, &rule));
    for (i, l) in lines.iter().enumerate() {
        let code = if i == 0 { BOLD_RED } else { YELLOW };
        eprintln!("{}", paint(use_err, code, &format!(" ⚠  {l}")));
    }
    eprintln!("{}", paint(use_err, BOLD_RED, &rule));
}
